// Log batch assembly
use crate::synth::content::{Level, next_event, next_level};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: Level,
    pub job: String,
    #[serde(rename = "log")]
    pub message: String,
    #[serde(rename = "_timestamp")]
    pub timestamp: String,
}

/// Serialises as a bare JSON array of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogBatch {
    records: Vec<LogRecord>,
}

impl LogBatch {
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// RFC 3339 at second precision with a `Z` offset.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Build `batch_size` records sharing the single capture instant `now`.
pub fn assemble<R: Rng + ?Sized>(
    rng: &mut R,
    batch_size: usize,
    jobs: &[String],
    now: DateTime<Utc>,
) -> LogBatch {
    let timestamp = format_timestamp(now);

    let records = (0..batch_size)
        .map(|_| LogRecord {
            level: next_level(rng),
            job: jobs
                .choose(rng)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            message: next_event(rng),
            timestamp: timestamp.clone(),
        })
        .collect();

    LogBatch { records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::content::JOB_TYPES;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn jobs() -> Vec<String> {
        JOB_TYPES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_assemble_exact_length() {
        let mut rng = StdRng::seed_from_u64(11);
        for size in [0, 1, 3, 100, 1000] {
            let batch = assemble(&mut rng, size, &jobs(), Utc::now());
            assert_eq!(batch.len(), size);
            assert_eq!(batch.is_empty(), size == 0);
        }
    }

    #[test]
    fn test_records_share_batch_timestamp() {
        let mut rng = StdRng::seed_from_u64(12);
        let now = Utc::now();
        let batch = assemble(&mut rng, 50, &jobs(), now);
        let expected = format_timestamp(now);
        assert!(batch.records().iter().all(|r| r.timestamp == expected));
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let mut rng = StdRng::seed_from_u64(13);
        let batch = assemble(&mut rng, 5, &jobs(), Utc::now());
        for record in batch.records() {
            assert!(DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
            assert!(record.timestamp.ends_with('Z'));
        }
    }

    #[test]
    fn test_timestamps_non_decreasing_across_batches() {
        let mut rng = StdRng::seed_from_u64(14);
        let mut previous: Option<DateTime<chrono::FixedOffset>> = None;
        for _ in 0..20 {
            let batch = assemble(&mut rng, 2, &jobs(), Utc::now());
            let ts = DateTime::parse_from_rfc3339(&batch.records()[0].timestamp).unwrap();
            if let Some(prev) = previous {
                assert!(ts >= prev);
            }
            previous = Some(ts);
        }
    }

    #[test]
    fn test_jobs_drawn_from_catalog() {
        let mut rng = StdRng::seed_from_u64(15);
        let catalog = jobs();
        let batch = assemble(&mut rng, 200, &catalog, Utc::now());
        assert!(batch.records().iter().all(|r| catalog.contains(&r.job)));
    }

    #[test]
    fn test_empty_job_catalog() {
        let mut rng = StdRng::seed_from_u64(16);
        let batch = assemble(&mut rng, 3, &[], Utc::now());
        assert!(batch.records().iter().all(|r| r.job == "unknown"));
    }

    #[test]
    fn test_wire_format_field_names() {
        let mut rng = StdRng::seed_from_u64(17);
        let batch = assemble(&mut rng, 2, &jobs(), Utc::now());
        let value = serde_json::to_value(&batch).unwrap();

        let array = value.as_array().expect("batch serialises as an array");
        assert_eq!(array.len(), 2);
        let object = array[0].as_object().unwrap();
        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["_timestamp", "job", "level", "log"]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut rng = StdRng::seed_from_u64(18);
        let batch = assemble(&mut rng, 25, &jobs(), Utc::now());
        let bytes = serde_json::to_vec(&batch).unwrap();
        let parsed: LogBatch = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, batch);
    }
}
