//! Job results and their CLI rendering.
//!
//! [`EncodedOutput`] is what the resize produces and what gets stored.
//! [`JobReport`] and [`RunStats`] summarize jobs for logs and the terminal.
//!
//! # Output Format
//!
//! ```text
//! completed 0001718000000000-00042-000000
//!     cat.png → resize_cat.png
//!     300x169 png, 18042 bytes
//!     sha256 3f0a…
//! abandoned 0001718000000001-00042-000001 (delivery 2)
//!     unsupported_format: Unsupported image format: scan.bmp
//! ```
//!
//! `format_*` functions return lines and do no I/O; `print_*` wrappers write
//! them to stdout.

use crate::error::JobError;
use crate::imaging::{EncodedImage, EncoderKind};
use crate::naming::output_file_name;
use sha2::{Digest, Sha256};
use std::fmt;

/// Resized bytes ready to store, with their derived name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedOutput {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoder: EncoderKind,
}

impl EncodedOutput {
    /// Name the encoded image after its source: `resize_<source>`.
    pub fn new(source_file_name: &str, encoded: EncodedImage) -> Self {
        Self {
            file_name: output_file_name(source_file_name),
            bytes: encoded.bytes,
            width: encoded.width,
            height: encoded.height,
            encoder: encoded.encoder,
        }
    }

    /// Hex SHA-256 of the encoded bytes.
    ///
    /// Identical inputs give identical digests, which makes redelivered
    /// jobs easy to spot in the logs.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}

/// Outcome of one successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub source: String,
    pub output: String,
    pub width: u32,
    pub height: u32,
    pub encoder: EncoderKind,
    pub size: u64,
    pub digest: String,
}

impl JobReport {
    pub fn from_output(source: &str, output: &EncodedOutput) -> Self {
        Self {
            source: source.to_string(),
            output: output.file_name.clone(),
            width: output.width,
            height: output.height,
            encoder: output.encoder,
            size: output.bytes.len() as u64,
            digest: output.digest(),
        }
    }
}

/// What happened to a received message.
#[derive(Debug)]
pub enum MessageOutcome {
    /// Output stored, message acknowledged.
    Completed { message_id: String, report: JobReport },
    /// Job failed, message released for redelivery.
    Abandoned {
        message_id: String,
        delivery_count: u32,
        error: JobError,
    },
}

/// Counters for a worker run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub completed: u32,
    pub abandoned: u32,
}

impl RunStats {
    pub fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Completed { .. } => self.completed += 1,
            MessageOutcome::Abandoned { .. } => self.abandoned += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.completed + self.abandoned
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.abandoned > 0 {
            write!(
                f,
                "{} completed, {} abandoned ({} total)",
                self.completed,
                self.abandoned,
                self.total()
            )
        } else {
            write!(f, "{} completed", self.completed)
        }
    }
}

/// Format a message outcome as display lines.
pub fn format_outcome(outcome: &MessageOutcome) -> Vec<String> {
    match outcome {
        MessageOutcome::Completed { message_id, report } => vec![
            format!("completed {message_id}"),
            format!("    {} → {}", report.source, report.output),
            format!(
                "    {}x{} {}, {} bytes",
                report.width, report.height, report.encoder, report.size
            ),
            format!("    sha256 {}", report.digest),
        ],
        MessageOutcome::Abandoned {
            message_id,
            delivery_count,
            error,
        } => vec![
            format!("abandoned {message_id} (delivery {delivery_count})"),
            format!("    {}: {}", error.kind(), error),
        ],
    }
}

pub fn print_outcome(outcome: &MessageOutcome) {
    for line in format_outcome(outcome) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_output() -> EncodedOutput {
        EncodedOutput::new(
            "cat.png",
            EncodedImage {
                bytes: b"hello".to_vec(),
                width: 30,
                height: 20,
                encoder: EncoderKind::Png,
            },
        )
    }

    #[test]
    fn output_is_named_after_source() {
        let out = sample_output();
        assert_eq!(out.file_name, "resize_cat.png");
        assert_eq!((out.width, out.height), (30, 20));
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            sample_output().digest(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn report_copies_output_facts() {
        let report = JobReport::from_output("cat.png", &sample_output());
        assert_eq!(report.output, "resize_cat.png");
        assert_eq!(report.size, 5);
        assert_eq!(report.encoder, EncoderKind::Png);
    }

    #[test]
    fn format_completed() {
        let outcome = MessageOutcome::Completed {
            message_id: "m1".into(),
            report: JobReport::from_output("cat.png", &sample_output()),
        };
        let lines = format_outcome(&outcome);
        assert_eq!(lines[0], "completed m1");
        assert_eq!(lines[1], "    cat.png → resize_cat.png");
        assert_eq!(lines[2], "    30x20 png, 5 bytes");
        assert!(lines[3].starts_with("    sha256 2cf24dba"));
    }

    #[test]
    fn format_abandoned() {
        let outcome = MessageOutcome::Abandoned {
            message_id: "m2".into(),
            delivery_count: 3,
            error: JobError::UnsupportedFormat {
                file_name: "scan.bmp".into(),
            },
        };
        assert_eq!(
            format_outcome(&outcome),
            vec![
                "abandoned m2 (delivery 3)".to_string(),
                "    unsupported_format: Unsupported image format: scan.bmp".to_string(),
            ]
        );
    }

    #[test]
    fn run_stats_display() {
        let mut stats = RunStats::default();
        assert_eq!(stats.to_string(), "0 completed");
        stats.completed = 4;
        stats.abandoned = 1;
        assert_eq!(stats.to_string(), "4 completed, 1 abandoned (5 total)");
    }
}
