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

//! Subword tokenization of sequences.

pub mod bert;

pub use tokenizers::Error;

/// A subword tokenizer backed by a fixed vocabulary.
///
/// The tokenizer neither frames nor pads the tokens, this is up to the [`encode()`] function.
///
/// [`encode()`]: crate::encode
pub trait Tokenize {
    /// Splits the sequence into subword tokens.
    fn tokenize(&self, sequence: &str) -> Result<Vec<String>, Error>;

    /// Maps the tokens to their ids in the vocabulary.
    ///
    /// Returns exactly one id per token.
    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Result<Vec<u32>, Error>;

    /// The reserved token which starts each sequence.
    fn class_token(&self) -> &str;

    /// The reserved token which ends each sequence.
    fn separation_token(&self) -> &str;
}
