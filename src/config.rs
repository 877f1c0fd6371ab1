//! Options controlling how a [`ShapefileReader`](crate::ShapefileReader) walks a dataset.

/// What record iteration does after a record fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Yield the error and stop.
    #[default]
    Fail,
    /// Log a warning and carry on with the next record.
    Skip,
}

/// Reader configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadOptions {
    #[serde(default)]
    pub on_malformed: MalformedPolicy,

    /// Compare each record header in the main file against its index entry.
    #[serde(default = "ReadOptions::default_verify_record_headers")]
    pub verify_record_headers: bool,
}

impl ReadOptions {
    const fn default_verify_record_headers() -> bool {
        true
    }

    pub fn with_on_malformed(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    pub fn with_verify_record_headers(mut self, verify: bool) -> Self {
        self.verify_record_headers = verify;
        self
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            on_malformed: MalformedPolicy::default(),
            verify_record_headers: Self::default_verify_record_headers(),
        }
    }
}
