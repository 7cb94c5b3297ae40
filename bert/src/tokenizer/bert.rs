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

use std::{
    fs::File,
    io::{BufRead, BufReader},
};

use tokenizers::{
    decoders::wordpiece::WordPiece as WordPieceDecoder,
    models::wordpiece::{WordPiece as WordPieceModel, WordPieceBuilder},
    normalizers::bert::BertNormalizer,
    pre_tokenizers::bert::BertPreTokenizer,
    processors::bert::BertProcessing,
    Error,
    Model,
    TokenizerBuilder,
    TokenizerImpl,
};

use crate::{config::Config, tokenizer::Tokenize};

/// A pre-configured Bert wordpiece tokenizer.
///
/// The vocabulary and the case folding flag are part of the pretrained model assets.
pub struct Tokenizer {
    bert: TokenizerImpl<
        WordPieceModel,
        BertNormalizer,
        BertPreTokenizer,
        BertProcessing,
        WordPieceDecoder,
    >,
    class_token: String,
    separation_token: String,
    unknown_id: u32,
}

impl Tokenizer {
    /// Creates a tokenizer from the `vocab.txt` and the `config.toml` in the configured dir.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let vocab = BufReader::new(File::open(config.dir.join("vocab.txt"))?)
            .lines()
            .enumerate()
            .map(|(idx, word)| Ok((word?.trim().to_string(), u32::try_from(idx)?)))
            .collect::<Result<_, Error>>()?;
        let unknown_token = config.extract::<String>("tokenizer.tokens.unknown")?;
        let model = WordPieceBuilder::new()
            .vocab(vocab)
            .unk_token(unknown_token.clone())
            .continuing_subword_prefix(config.extract("tokenizer.tokens.continuation")?)
            .max_input_chars_per_word(config.extract("tokenizer.max-chars")?)
            .build()?;
        let normalizer = BertNormalizer::new(
            config.extract("tokenizer.cleanse-text")?,
            true,
            Some(config.extract("tokenizer.cleanse-accents")?),
            config.extract("tokenizer.lower-case")?,
        );

        let unknown_id = model
            .token_to_id(&unknown_token)
            .ok_or("missing unknown token")?;
        let class_token = config.extract::<String>("tokenizer.tokens.class")?;
        model
            .token_to_id(&class_token)
            .ok_or("missing class token")?;
        let separation_token = config.extract::<String>("tokenizer.tokens.separation")?;
        model
            .token_to_id(&separation_token)
            .ok_or("missing separation token")?;

        // framing, truncation and padding are left to the encoding
        let bert = TokenizerBuilder::new()
            .with_model(model)
            .with_normalizer(Some(normalizer))
            .with_pre_tokenizer(Some(BertPreTokenizer))
            .build()?;

        Ok(Tokenizer {
            bert,
            class_token,
            separation_token,
            unknown_id,
        })
    }
}

impl Tokenize for Tokenizer {
    fn tokenize(&self, sequence: &str) -> Result<Vec<String>, Error> {
        self.bert
            .encode(sequence, false)
            .map(|encoding| encoding.get_tokens().to_vec())
    }

    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Result<Vec<u32>, Error> {
        Ok(tokens
            .iter()
            .map(|token| self.bert.token_to_id(token).unwrap_or(self.unknown_id))
            .collect())
    }

    fn class_token(&self) -> &str {
        &self.class_token
    }

    fn separation_token(&self) -> &str {
        &self.separation_token
    }
}
