// Copyright 2023 Xayn AG
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

use std::iter;

use derive_more::{Deref, From};
use displaydoc::Display;
use ndarray::{s, Array2, Axis};
use thiserror::Error;

use crate::tokenizer::Tokenize;

/// The number of tokens per encoded sequence.
///
/// This includes the class and separation tokens, hence it is at least `2`.
#[derive(Clone, Copy, Debug, Deref, PartialEq, Eq)]
pub struct TokenSize(usize);

impl TokenSize {
    /// The smallest valid token size.
    pub const MIN: usize = 2;

    /// Creates a token size.
    ///
    /// # Errors
    /// Fails if `size` can't hold the class and separation tokens.
    pub fn new(size: usize) -> Result<Self, EncodingError> {
        if size < Self::MIN {
            Err(EncodingError::TokenSize(size))
        } else {
            Ok(Self(size))
        }
    }

    /// The maximum number of subword tokens of a sequence which fit in between the reserved
    /// tokens.
    pub fn max_tokens(self) -> usize {
        self.0 - Self::MIN
    }
}

impl TryFrom<usize> for TokenSize {
    type Error = EncodingError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

/// The potential errors of the encoding.
#[derive(Debug, Display, Error)]
pub enum EncodingError {
    /// Invalid token size {0}, it must be at least 2 to hold the class and separation tokens
    TokenSize(usize),
    /// Failed to tokenize the sequence: {0}
    Tokenizer(#[from] tokenizers::Error),
    /// The tokenizer returned {ids} ids for {tokens} tokens
    IdCount { tokens: usize, ids: usize },
}

/// The token ids of the encoded sequences.
///
/// The token ids are of shape `(batch_size, token_size)`.
#[derive(Clone, Debug, Deref, From, PartialEq, Eq)]
pub struct TokenIds(pub(crate) Array2<i64>);

/// The attention mask of the encoded sequences.
///
/// The attention mask is of shape `(batch_size, token_size)`.
#[derive(Clone, Debug, Deref, From, PartialEq, Eq)]
pub struct AttentionMask(pub(crate) Array2<i64>);

/// The type ids of the encoded sequences.
///
/// The type ids are of shape `(batch_size, token_size)`.
#[derive(Clone, Debug, Deref, From, PartialEq, Eq)]
pub struct TypeIds(pub(crate) Array2<i64>);

/// The encoded sequences.
///
/// Each row holds one sequence, aligned over the token ids, attention mask and type ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoding {
    pub(crate) token_ids: TokenIds,
    pub(crate) attention_mask: AttentionMask,
    pub(crate) type_ids: TypeIds,
}

impl Encoding {
    pub fn token_ids(&self) -> &TokenIds {
        &self.token_ids
    }

    pub fn attention_mask(&self) -> &AttentionMask {
        &self.attention_mask
    }

    pub fn type_ids(&self) -> &TypeIds {
        &self.type_ids
    }

    /// The number of encoded sequences.
    pub fn batch_size(&self) -> usize {
        self.token_ids.nrows()
    }

    /// The number of tokens per encoded sequence.
    pub fn token_size(&self) -> usize {
        self.token_ids.ncols()
    }

    /// Splits the encoding into single sequence encodings of shape `(1, token_size)`.
    pub fn rows(&self) -> impl '_ + Iterator<Item = Encoding> {
        (0..self.batch_size()).map(move |row| {
            let select = |array: &Array2<i64>| array.slice(s![row..=row, ..]).to_owned();
            Encoding {
                token_ids: select(&self.token_ids).into(),
                attention_mask: select(&self.attention_mask).into(),
                type_ids: select(&self.type_ids).into(),
            }
        })
    }

    /// The number of real, non-padding tokens per sequence.
    pub fn lengths(&self) -> Vec<usize> {
        self.attention_mask
            .sum_axis(Axis(1))
            .iter()
            .map(|&length| usize::try_from(length).unwrap_or_default())
            .collect()
    }
}

/// Encodes the sequences.
///
/// Each sequence is tokenized and truncated to its first `token_size - 2` tokens, framed by the
/// class and separation tokens and padded with zeros up to the token size. The attention mask
/// marks the framed tokens and the type ids are all zero.
///
/// An empty batch of sequences results in an encoding of shape `(0, token_size)`.
pub fn encode<T>(
    tokenizer: &T,
    sequences: &[impl AsRef<str>],
    token_size: TokenSize,
) -> Result<Encoding, EncodingError>
where
    T: Tokenize + ?Sized,
{
    let shape = (sequences.len(), *token_size);
    let mut token_ids = Array2::<i64>::zeros(shape);
    let mut attention_mask = Array2::<i64>::zeros(shape);

    for (row, sequence) in sequences.iter().enumerate() {
        let ids = encode_sequence(tokenizer, sequence.as_ref(), token_size)?;
        attention_mask.slice_mut(s![row, ..ids.len()]).fill(1);
        for (column, id) in ids.into_iter().enumerate() {
            token_ids[[row, column]] = i64::from(id);
        }
    }
    tracing::debug!(
        batch_size = sequences.len(),
        token_size = *token_size,
        "encoded sequences",
    );

    Ok(Encoding {
        token_ids: token_ids.into(),
        attention_mask: attention_mask.into(),
        type_ids: Array2::zeros(shape).into(),
    })
}

/// Encodes the ids of a single framed sequence without the padding.
fn encode_sequence<T>(
    tokenizer: &T,
    sequence: &str,
    token_size: TokenSize,
) -> Result<Vec<u32>, EncodingError>
where
    T: Tokenize + ?Sized,
{
    let mut tokens = tokenizer.tokenize(sequence)?;
    tokens.truncate(token_size.max_tokens());
    let tokens = iter::once(tokenizer.class_token().to_string())
        .chain(tokens)
        .chain(iter::once(tokenizer.separation_token().to_string()))
        .collect::<Vec<_>>();

    let ids = tokenizer.convert_tokens_to_ids(&tokens)?;
    if ids.len() == tokens.len() {
        Ok(ids)
    } else {
        Err(EncodingError::IdCount {
            tokens: tokens.len(),
            ids: ids.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use ndarray::{arr2, ArrayView};
    use tokenizers::Error;

    use super::*;

    pub(crate) const CLASS_ID: u32 = 101;
    pub(crate) const SEPARATION_ID: u32 = 102;
    const UNKNOWN_ID: u32 = 100;

    /// Splits at whitespace and looks the words up in a fixed vocabulary.
    pub(crate) struct WhitespaceTokenizer {
        vocab: HashMap<String, u32>,
    }

    impl Default for WhitespaceTokenizer {
        fn default() -> Self {
            let vocab = [
                ("[CLS]", CLASS_ID),
                ("[SEP]", SEPARATION_ID),
                ("forest", 2000),
                ("fire", 2001),
                ("near", 2002),
                ("town", 2003),
                ("storm", 2004),
                ("surge", 2005),
                ("ahead", 2006),
            ]
            .into_iter()
            .map(|(token, id)| (token.to_string(), id))
            .collect();

            Self { vocab }
        }
    }

    impl Tokenize for WhitespaceTokenizer {
        fn tokenize(&self, sequence: &str) -> Result<Vec<String>, Error> {
            Ok(sequence.split_whitespace().map(str::to_lowercase).collect())
        }

        fn convert_tokens_to_ids(&self, tokens: &[String]) -> Result<Vec<u32>, Error> {
            Ok(tokens
                .iter()
                .map(|token| self.vocab.get(token).copied().unwrap_or(UNKNOWN_ID))
                .collect())
        }

        fn class_token(&self) -> &str {
            "[CLS]"
        }

        fn separation_token(&self) -> &str {
            "[SEP]"
        }
    }

    /// Drops the last id of every conversion.
    struct LossyTokenizer(WhitespaceTokenizer);

    impl Tokenize for LossyTokenizer {
        fn tokenize(&self, sequence: &str) -> Result<Vec<String>, Error> {
            self.0.tokenize(sequence)
        }

        fn convert_tokens_to_ids(&self, tokens: &[String]) -> Result<Vec<u32>, Error> {
            let mut ids = self.0.convert_tokens_to_ids(tokens)?;
            ids.pop();
            Ok(ids)
        }

        fn class_token(&self) -> &str {
            self.0.class_token()
        }

        fn separation_token(&self) -> &str {
            self.0.separation_token()
        }
    }

    struct FailingTokenizer;

    impl Tokenize for FailingTokenizer {
        fn tokenize(&self, _sequence: &str) -> Result<Vec<String>, Error> {
            Err("vocabulary not loaded".into())
        }

        fn convert_tokens_to_ids(&self, _tokens: &[String]) -> Result<Vec<u32>, Error> {
            Err("vocabulary not loaded".into())
        }

        fn class_token(&self) -> &str {
            "[CLS]"
        }

        fn separation_token(&self) -> &str {
            "[SEP]"
        }
    }

    fn token_size(size: usize) -> TokenSize {
        TokenSize::new(size).unwrap()
    }

    #[test]
    fn test_token_size() {
        assert!(matches!(
            TokenSize::new(0),
            Err(EncodingError::TokenSize(0)),
        ));
        assert!(matches!(
            TokenSize::try_from(1),
            Err(EncodingError::TokenSize(1)),
        ));
        assert_eq!(token_size(2).max_tokens(), 0);
        assert_eq!(token_size(160).max_tokens(), 158);
    }

    #[test]
    fn test_encode_short() {
        let encoding = encode(
            &WhitespaceTokenizer::default(),
            &["forest fire near"],
            token_size(10),
        )
        .unwrap();

        let shape = (1, 10);
        assert_eq!(encoding.batch_size(), 1);
        assert_eq!(encoding.token_size(), 10);
        assert_eq!(
            **encoding.token_ids(),
            ArrayView::from_shape(shape, &[101, 2000, 2001, 2002, 102, 0, 0, 0, 0, 0]).unwrap(),
        );
        assert_eq!(
            **encoding.attention_mask(),
            ArrayView::from_shape(shape, &[1, 1, 1, 1, 1, 0, 0, 0, 0, 0]).unwrap(),
        );
        assert_eq!(**encoding.type_ids(), Array2::<i64>::zeros(shape));
    }

    #[test]
    fn test_encode_truncates_suffix() {
        let encoding = encode(
            &WhitespaceTokenizer::default(),
            &["forest fire near town storm surge ahead"],
            token_size(5),
        )
        .unwrap();

        // the separation token keeps its reserved slot, the tail of the sequence is dropped
        assert_eq!(
            **encoding.token_ids(),
            arr2(&[[101, 2000, 2001, 2002, 102]]),
        );
        assert_eq!(**encoding.attention_mask(), arr2(&[[1, 1, 1, 1, 1]]));
    }

    #[test]
    fn test_encode_exact_fit() {
        let encoding = encode(
            &WhitespaceTokenizer::default(),
            &["storm surge"],
            token_size(4),
        )
        .unwrap();
        assert_eq!(**encoding.token_ids(), arr2(&[[101, 2004, 2005, 102]]));
        assert_eq!(**encoding.attention_mask(), arr2(&[[1, 1, 1, 1]]));
    }

    #[test]
    fn test_encode_minimal_token_size() {
        let encoding = encode(
            &WhitespaceTokenizer::default(),
            &["forest fire"],
            token_size(2),
        )
        .unwrap();
        assert_eq!(**encoding.token_ids(), arr2(&[[101, 102]]));
        assert_eq!(**encoding.attention_mask(), arr2(&[[1, 1]]));
        assert_eq!(**encoding.type_ids(), arr2(&[[0, 0]]));
    }

    #[test]
    fn test_encode_empty_sequence() {
        let encoding = encode(&WhitespaceTokenizer::default(), &[""], token_size(4)).unwrap();
        assert_eq!(**encoding.token_ids(), arr2(&[[101, 102, 0, 0]]));
        assert_eq!(**encoding.attention_mask(), arr2(&[[1, 1, 0, 0]]));
    }

    #[test]
    fn test_encode_empty_batch() {
        let encoding =
            encode(&WhitespaceTokenizer::default(), &[] as &[&str], token_size(8)).unwrap();
        assert_eq!(encoding.batch_size(), 0);
        assert_eq!(encoding.token_ids().shape(), [0, 8]);
        assert_eq!(encoding.attention_mask().shape(), [0, 8]);
        assert_eq!(encoding.type_ids().shape(), [0, 8]);
        assert_eq!(encoding.rows().count(), 0);
    }

    #[test]
    fn test_encode_batch_properties() {
        let tokenizer = WhitespaceTokenizer::default();
        let sequences = [
            "",
            "fire",
            "forest fire near town",
            "unknown words are not dropped at all",
            "storm surge ahead storm surge ahead storm surge ahead",
        ];

        for size in [2, 3, 5, 8, 16] {
            let encoding = encode(&tokenizer, &sequences, token_size(size)).unwrap();
            assert_eq!(encoding.token_ids().shape(), [sequences.len(), size]);
            assert_eq!(encoding.attention_mask().shape(), [sequences.len(), size]);
            assert_eq!(encoding.type_ids().shape(), [sequences.len(), size]);
            assert!(encoding.type_ids().iter().all(|&id| id == 0));

            let lengths = encoding.lengths();
            for (row, sequence) in sequences.iter().enumerate() {
                let tokens = sequence.split_whitespace().count();
                let length = lengths[row];
                assert_eq!(length, size.min(tokens + 2));

                let token_ids = encoding.token_ids().row(row);
                let attention_mask = encoding.attention_mask().row(row);
                assert_eq!(token_ids[0], i64::from(CLASS_ID));
                assert_eq!(token_ids[length - 1], i64::from(SEPARATION_ID));
                assert!(attention_mask.iter().take(length).all(|&mask| mask == 1));
                assert!(attention_mask.iter().skip(length).all(|&mask| mask == 0));
                assert!(token_ids.iter().skip(length).all(|&id| id == 0));
            }
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let tokenizer = WhitespaceTokenizer::default();
        let sequences = ["forest fire near town", "storm surge"];
        let first = encode(&tokenizer, &sequences, token_size(6)).unwrap();
        let second = encode(&tokenizer, &sequences, token_size(6)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encode_rows_are_independent() {
        let tokenizer = WhitespaceTokenizer::default();
        let sequences = ["forest fire near town", "", "storm surge ahead"];
        let batch = encode(&tokenizer, &sequences, token_size(6)).unwrap();

        for (row, sequence) in batch.rows().zip(sequences) {
            assert_eq!(row, encode(&tokenizer, &[sequence], token_size(6)).unwrap());
        }
    }

    #[test]
    fn test_encode_id_count_mismatch() {
        let tokenizer = LossyTokenizer(WhitespaceTokenizer::default());
        assert!(matches!(
            encode(&tokenizer, &["forest fire"], token_size(8)),
            Err(EncodingError::IdCount { tokens: 4, ids: 3 }),
        ));
    }

    #[test]
    fn test_encode_tokenizer_failure() {
        let error = encode(&FailingTokenizer, &["forest fire"], token_size(8)).unwrap_err();
        assert!(matches!(error, EncodingError::Tokenizer(_)));
        assert!(error.to_string().contains("vocabulary not loaded"));
    }
}
