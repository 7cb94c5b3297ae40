// Copyright 2021 Xayn AG
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! The Bert pipeline prepares sequences for and computes the aggregate representations of a
//! pretrained Bert encoder.
//!
//! Bert reads a sequence as subword tokens framed by two reserved tokens: the class token
//! `[CLS]` at the start, whose contextual embedding represents the whole sequence, and the
//! separation token `[SEP]` at the end. The encoder attends to every real token at once, so
//! each input row has a fixed token size and an attention mask marks which positions hold real
//! tokens and which hold padding. Segment (type) ids would tell apart two sentences of a paired
//! input, but a single sequence always has type id `0`.
//!
//! The [`encode()`] function packs sequences into such rows, the [`Pipeline`] runs them
//! through the encoder and pools the class token representations, which a downstream head
//! can classify.

#![forbid(unsafe_op_in_unsafe_fn)]
#![deny(
    clippy::future_not_send,
    clippy::pedantic,
    noop_method_call,
    rust_2018_idioms,
    unsafe_code,
    unused_qualifications
)]
#![warn(unreachable_pub, rustdoc::missing_crate_level_docs)]
#![allow(
    clippy::items_after_statements,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

mod config;
mod encoding;
pub mod hub;
mod model;
mod pipeline;
mod pooler;
pub mod tokenizer;

pub use crate::{
    config::Config,
    encoding::{encode, AttentionMask, Encoding, EncodingError, TokenIds, TokenSize, TypeIds},
    model::{Model, Predict, Prediction},
    pipeline::{Pipeline, PipelineError},
    pooler::{Embedding2, FirstPooler},
};

/// A Bert pipeline with the vocabulary based tokenizer and the onnx model.
pub type Bert = Pipeline<tokenizer::bert::Tokenizer, Model>;
