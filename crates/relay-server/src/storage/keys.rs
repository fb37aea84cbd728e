//! Store key layout
//!
//! One hash per job, one blob per chunk, one list per job for failures.
//! Everything lives under the `import:` namespace so the retention sweep
//! can enumerate job state with a single prefix scan.

/// Prefix shared by all job hashes
pub const JOB_KEY_PREFIX: &str = "import:job:";

/// Key of the job record hash
pub fn job_key(job_id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{job_id}")
}

/// Key of one submitted chunk blob
pub fn chunk_key(job_id: &str, chunk_index: u32) -> String {
    format!("import:chunk:{job_id}:{chunk_index}")
}

/// Key of the append-only failure list for a job
pub fn failure_key(job_id: &str) -> String {
    format!("import:failures:{job_id}")
}

/// Key of a per-owner rate-limit window counter
pub fn rate_limit_key(owner_id: &str, window_start: i64) -> String {
    format!("import:ratelimit:{owner_id}:{window_start}")
}

/// Extract the job id back out of a job hash key
pub fn job_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(JOB_KEY_PREFIX)
}
