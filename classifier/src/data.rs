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

//! Reading of tweets and writing of submissions in csv format.

use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
};

use displaydoc::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tweet of the disaster tweets dataset.
///
/// Only labeled tweets have a target, `1` for a real disaster and `0` otherwise.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Tweet {
    pub id: u64,
    pub keyword: Option<String>,
    pub location: Option<String>,
    pub text: String,
    #[serde(default)]
    pub target: Option<u8>,
}

/// A row of a submission.
#[derive(Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub id: u64,
    pub target: u8,
}

/// The potential errors of reading and writing the data.
#[derive(Debug, Display, Error)]
pub enum DataError {
    /// Failed to open the data file: {0}
    Io(#[from] io::Error),
    /// Malformed csv data: {0}
    Csv(#[from] csv::Error),
    /// Tweet {id} lacks a binary target
    MissingTarget { id: u64 },
    /// Got {predictions} predictions for {tweets} tweets
    PredictionCount { tweets: usize, predictions: usize },
}

/// Reads the tweets from a csv file with headers.
pub fn read_tweets(path: impl AsRef<Path>) -> Result<Vec<Tweet>, DataError> {
    read_tweets_from(File::open(path)?)
}

/// Reads the tweets from csv data with headers.
pub fn read_tweets_from(reader: impl Read) -> Result<Vec<Tweet>, DataError> {
    let tweets = csv::Reader::from_reader(reader)
        .into_deserialize()
        .collect::<Result<Vec<Tweet>, _>>()?;
    tracing::debug!(tweets = tweets.len(), "read tweets");

    Ok(tweets)
}

/// Gets the texts of the tweets.
pub fn texts(tweets: &[Tweet]) -> Vec<&str> {
    tweets.iter().map(|tweet| tweet.text.as_str()).collect()
}

/// Gets the binary targets of the labeled tweets.
pub fn labels(tweets: &[Tweet]) -> Result<Vec<u8>, DataError> {
    tweets
        .iter()
        .map(|tweet| match tweet.target {
            Some(target @ (0 | 1)) => Ok(target),
            _ => Err(DataError::MissingTarget { id: tweet.id }),
        })
        .collect()
}

/// Writes the predicted targets of the tweets to a csv file.
pub fn write_submission(
    path: impl AsRef<Path>,
    tweets: &[Tweet],
    predictions: &[u8],
) -> Result<(), DataError> {
    write_submission_to(File::create(path)?, tweets, predictions)
}

/// Writes the predicted targets of the tweets as csv data with an `id,target` header.
pub fn write_submission_to(
    writer: impl Write,
    tweets: &[Tweet],
    predictions: &[u8],
) -> Result<(), DataError> {
    if tweets.len() != predictions.len() {
        return Err(DataError::PredictionCount {
            tweets: tweets.len(),
            predictions: predictions.len(),
        });
    }

    let mut writer = csv::Writer::from_writer(writer);
    for (tweet, &target) in tweets.iter().zip(predictions) {
        writer.serialize(Submission {
            id: tweet.id,
            target,
        })?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAIN: &str = "\
id,keyword,location,text,target
1,,,Our Deeds are the Reason of this #earthquake May ALLAH Forgive us all,1
4,,,Forest fire near La Ronge Sask. Canada,1
48,ablaze,Birmingham,@bbcmtd Wholesale Markets ablaze http://t.co/lHYXEOHY6C,1
23,,,What's up man?,0
";

    const TEST: &str = "\
id,keyword,location,text
0,,,Just happened a terrible car crash
2,,,\"Heard about #earthquake is different cities, stay safe everyone.\"
";

    #[test]
    fn test_read_labeled() {
        let tweets = read_tweets_from(TRAIN.as_bytes()).unwrap();
        assert_eq!(tweets.len(), 4);
        assert_eq!(
            tweets[2],
            Tweet {
                id: 48,
                keyword: Some("ablaze".into()),
                location: Some("Birmingham".into()),
                text: "@bbcmtd Wholesale Markets ablaze http://t.co/lHYXEOHY6C".into(),
                target: Some(1),
            },
        );
        assert_eq!(tweets[0].keyword, None);
        assert_eq!(labels(&tweets).unwrap(), [1, 1, 1, 0]);
        assert_eq!(texts(&tweets)[1], "Forest fire near La Ronge Sask. Canada");
    }

    #[test]
    fn test_read_unlabeled() {
        let tweets = read_tweets_from(TEST.as_bytes()).unwrap();
        assert_eq!(tweets.len(), 2);
        assert!(tweets.iter().all(|tweet| tweet.target.is_none()));
        assert_eq!(
            tweets[1].text,
            "Heard about #earthquake is different cities, stay safe everyone.",
        );
        assert!(matches!(
            labels(&tweets),
            Err(DataError::MissingTarget { id: 0 }),
        ));
    }

    #[test]
    fn test_invalid_target() {
        let tweets = read_tweets_from("id,keyword,location,text,target\n7,,,flood,2\n".as_bytes())
            .unwrap();
        assert!(matches!(
            labels(&tweets),
            Err(DataError::MissingTarget { id: 7 }),
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            read_tweets_from("id,keyword,location\n1,,\n".as_bytes()),
            Err(DataError::Csv(_)),
        ));
        assert!(matches!(
            read_tweets_from("id,keyword,location,text\nnone,,,flood\n".as_bytes()),
            Err(DataError::Csv(_)),
        ));
        assert!(matches!(
            read_tweets(Path::new("missing.csv")),
            Err(DataError::Io(_)),
        ));
    }

    #[test]
    fn test_write_submission() {
        let tweets = read_tweets_from(TEST.as_bytes()).unwrap();
        let mut csv = Vec::new();
        write_submission_to(&mut csv, &tweets, &[1, 0]).unwrap();
        assert_eq!(String::from_utf8(csv).unwrap(), "id,target\n0,1\n2,0\n");

        assert!(matches!(
            write_submission_to(Vec::new(), &tweets, &[1]),
            Err(DataError::PredictionCount {
                tweets: 2,
                predictions: 1,
            }),
        ));
    }

    #[test]
    fn test_submission_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submission.csv");
        let tweets = read_tweets_from(TRAIN.as_bytes()).unwrap();
        write_submission(&path, &tweets, &[0, 1, 1, 0]).unwrap();

        let submission = csv::Reader::from_path(&path)
            .unwrap()
            .into_deserialize()
            .collect::<Result<Vec<Submission>, _>>()
            .unwrap();
        assert_eq!(
            submission,
            [
                Submission { id: 1, target: 0 },
                Submission { id: 4, target: 1 },
                Submission { id: 48, target: 1 },
                Submission { id: 23, target: 0 },
            ],
        );
    }
}
