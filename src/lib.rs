//! # Resize Worker
//!
//! A queue-triggered image resize worker. Each message names a stored image
//! and a target box; the worker fits the image into the box, re-encodes it
//! in its original format and stores it next to the source as
//! `resize_<name>`.
//!
//! # Architecture: One Message, One Job
//!
//! ```text
//! queue ──► ResizeRequest ──► fetch images/<name>
//!                                   │
//!                       EncoderKind from extension
//!                                   │
//!                  decode → max-fit resize (linear light) → encode
//!                                   │
//!                   store resize-images/resize_<name> ──► complete
//! ```
//!
//! Stages are strictly sequential and each consumes the full output of the
//! previous one. Any failure abandons the message instead of completing it,
//! so retries come only from queue redelivery. Jobs are deterministic, which
//! makes redelivery safe.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Codec selection, max-fit math, companded resize, PNG/GIF/JPEG encoding |
//! | [`request`] | Inbound message body → validated [`request::ResizeRequest`] |
//! | [`naming`] | Output blob naming and extension parsing |
//! | [`storage`] | [`storage::BlobStore`] trait, local and in-memory backends, process-wide client |
//! | [`queue`] | [`queue::MessageQueue`] trait and the spool-directory queue |
//! | [`worker`] | [`worker::run_job`] and the [`worker::Worker`] poll loop |
//! | [`error`] | [`error::JobError`], the per-job failure taxonomy |
//! | [`config`] | Layered TOML + environment configuration |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`output`] | Job reports and CLI formatting |
//!
//! # Design Decisions
//!
//! ## Encoder Follows the Extension
//!
//! The output format is chosen from the source name's extension, not from
//! the decoded content, and there is no transcoding: `cat.png` is always
//! written as PNG. Unknown extensions fail the job before any pixel work.
//!
//! ## Resize in Linear Light
//!
//! Averaging gamma-encoded sRGB values darkens edges and fine detail on
//! downscale. The [`imaging`] backend converts to linear premultiplied
//! floats, resamples, and converts back.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling and encoding all use the `image` crate. The binary
//! has no system library dependencies.

pub mod config;
pub mod error;
pub mod imaging;
pub mod logging;
pub mod naming;
pub mod output;
pub mod queue;
pub mod request;
pub mod storage;
pub mod worker;
