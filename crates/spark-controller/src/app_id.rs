//! Application identifiers
//!
//! Every submission attempt gets its own appID of the form
//! `<name>-<32-bit hash>`. The hash covers the resource identity and the
//! dispatch time, so resubmitting the same resource yields a new appID.

use chrono::{DateTime, Utc};
use kube::ResourceExt;

use spark_common::crd::SparkApplication;

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hasher fed with successive byte chunks
struct Fnv32a(u32);

impl Fnv32a {
    fn new() -> Self {
        Self(FNV32_OFFSET_BASIS)
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u32::from(*byte);
            self.0 = self.0.wrapping_mul(FNV32_PRIME);
        }
    }

    fn finish(&self) -> u32 {
        self.0
    }
}

/// Build the appID for a submission dispatched at `dispatched_at`
pub fn build_app_id(app: &SparkApplication, dispatched_at: DateTime<Utc>) -> String {
    let name = app.name_any();
    let nanos = dispatched_at.timestamp_nanos_opt().unwrap_or_default();

    let mut hasher = Fnv32a::new();
    hasher.write(name.as_bytes());
    hasher.write(app.namespace().unwrap_or_default().as_bytes());
    hasher.write(app.uid().unwrap_or_default().as_bytes());
    hasher.write(nanos.to_string().as_bytes());

    format!("{}-{}", name, hasher.finish())
}
