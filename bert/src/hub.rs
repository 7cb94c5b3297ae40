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

//! Fetching of pretrained model assets.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use displaydoc::Display;
use reqwest::blocking::Client;
use thiserror::Error;

/// The files which make up the assets of a pretrained model.
pub const ASSETS: [&str; 3] = ["config.toml", "vocab.txt", "model.onnx"];

/// The potential errors of the [`Hub`].
#[derive(Debug, Display, Error)]
pub enum HubError {
    /// External dependency unavailable, failed to fetch {asset}: {source}
    Unavailable {
        asset: String,
        #[source]
        source: reqwest::Error,
    },
    /// Failed to cache the asset: {0}
    Io(#[from] io::Error),
}

/// A remote store of pretrained model assets with a local cache.
///
/// The assets of a model named `name` are fetched from `{url}/{name}/{file}` and cached in
/// `{cache}/{name}/{file}`.
pub struct Hub {
    client: Client,
    url: String,
    cache: PathBuf,
    timeout: Duration,
}

impl Hub {
    pub fn new(url: impl Into<String>, cache: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            cache: cache.into(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Configures the timeout per asset.
    ///
    /// The timeout defaults to 5min.
    #[must_use = "dropped changed hub"]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ensures that all assets of the model are cached and returns the cached model dir.
    ///
    /// Assets which are already cached aren't fetched again.
    pub fn fetch(&self, name: &str) -> Result<PathBuf, HubError> {
        let dir = self.cache.join(name);
        fs::create_dir_all(&dir)?;

        for asset in ASSETS {
            let path = dir.join(asset);
            if path.exists() {
                tracing::debug!(path = %path.display(), "asset is cached");
                continue;
            }
            self.download(&format!("{}/{name}/{asset}", self.url), &path)?;
        }

        Ok(dir)
    }

    fn download(&self, url: &str, path: &Path) -> Result<(), HubError> {
        tracing::info!(url, "fetching asset");
        let unavailable = |source| HubError::Unavailable {
            asset: url.to_string(),
            source,
        };
        let mut response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(unavailable)?;

        // only complete downloads appear under the asset name
        let part = path.with_extension("part");
        let written = File::create(&part)
            .map_err(HubError::from)
            .and_then(|file| {
                let mut file = BufWriter::new(file);
                let bytes = response.copy_to(&mut file).map_err(unavailable)?;
                file.flush()?;
                Ok(bytes)
            })
            .and_then(|bytes| fs::rename(&part, path).map(|()| bytes).map_err(Into::into));
        match written {
            Ok(bytes) => {
                tracing::info!(path = %path.display(), bytes, "cached asset");
                Ok(())
            }
            Err(error) => {
                if let Err(error) = fs::remove_file(&part) {
                    tracing::debug!(path = %part.display(), %error, "no partial asset to remove");
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader},
        net::TcpListener,
        thread::{self, JoinHandle},
    };

    use super::*;

    /// Serves the given number of requests with the responses for the requested paths.
    ///
    /// Returns the url of the server and a handle which yields the requested paths.
    fn serve(
        requests: usize,
        respond: impl 'static + Send + Fn(&str) -> String,
    ) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let mut paths = Vec::with_capacity(requests);
            for stream in listener.incoming().take(requests) {
                let mut stream = stream.unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request = String::new();
                reader.read_line(&mut request).unwrap();
                let path = request.split_whitespace().nth(1).unwrap().to_string();
                let mut header = String::new();
                while reader.read_line(&mut header).unwrap() > 2 {
                    header.clear();
                }
                stream.write_all(respond(&path).as_bytes()).unwrap();
                stream.flush().unwrap();
                paths.push(path);
            }
            paths
        });

        (url, server)
    }

    fn ok(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len(),
        )
    }

    fn part_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().map_or(false, |extension| extension == "part"))
            .collect()
    }

    #[test]
    fn test_fetch_downloads() {
        let cache = tempfile::tempdir().unwrap();
        let (url, server) = serve(ASSETS.len(), |path| ok(&format!("content of {path}")));
        let hub = Hub::new(url, cache.path()).with_timeout(Duration::from_secs(5));

        let dir = hub.fetch("tiny").unwrap();
        assert_eq!(dir, cache.path().join("tiny"));
        for asset in ASSETS {
            assert_eq!(
                fs::read_to_string(dir.join(asset)).unwrap(),
                format!("content of /tiny/{asset}"),
            );
        }
        assert!(part_files(&dir).is_empty());
        assert_eq!(
            server.join().unwrap(),
            ["/tiny/config.toml", "/tiny/vocab.txt", "/tiny/model.onnx"],
        );
    }

    #[test]
    fn test_fetch_only_missing() {
        let cache = tempfile::tempdir().unwrap();
        let dir = cache.path().join("tiny");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.toml"), "cached config").unwrap();
        fs::write(dir.join("model.onnx"), "cached model").unwrap();
        let (url, server) = serve(1, |_| ok("fetched vocab"));
        let hub = Hub::new(url, cache.path()).with_timeout(Duration::from_secs(5));

        hub.fetch("tiny").unwrap();
        assert_eq!(server.join().unwrap(), ["/tiny/vocab.txt"]);
        assert_eq!(
            fs::read_to_string(dir.join("config.toml")).unwrap(),
            "cached config",
        );
        assert_eq!(
            fs::read_to_string(dir.join("vocab.txt")).unwrap(),
            "fetched vocab",
        );
        assert_eq!(
            fs::read_to_string(dir.join("model.onnx")).unwrap(),
            "cached model",
        );
        assert!(part_files(&dir).is_empty());
    }

    #[test]
    fn test_fetch_truncated() {
        let cache = tempfile::tempdir().unwrap();
        // the connection closes before the announced content length is transferred
        let (url, server) = serve(1, |_| {
            "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\npartial".into()
        });
        let hub = Hub::new(url, cache.path()).with_timeout(Duration::from_secs(5));

        assert!(matches!(
            hub.fetch("tiny"),
            Err(HubError::Unavailable { .. }),
        ));
        server.join().unwrap();
        let dir = cache.path().join("tiny");
        assert!(!dir.join("config.toml").exists());
        assert!(part_files(&dir).is_empty());
    }

    #[test]
    fn test_fetch_cached() {
        let cache = tempfile::tempdir().unwrap();
        let dir = cache.path().join("tiny");
        fs::create_dir_all(&dir).unwrap();
        for asset in ASSETS {
            fs::write(dir.join(asset), asset).unwrap();
        }

        // nothing listens on the discard port, any request would fail
        let hub = Hub::new("http://127.0.0.1:9/", cache.path());
        assert_eq!(hub.fetch("tiny").unwrap(), dir);
        for asset in ASSETS {
            assert_eq!(fs::read_to_string(dir.join(asset)).unwrap(), asset);
        }
    }

    #[test]
    fn test_fetch_unavailable() {
        let cache = tempfile::tempdir().unwrap();
        let hub =
            Hub::new("http://127.0.0.1:9", cache.path()).with_timeout(Duration::from_secs(5));

        let error = hub.fetch("tiny").unwrap_err();
        assert!(matches!(
            &error,
            HubError::Unavailable { asset, .. } if asset == "http://127.0.0.1:9/tiny/config.toml",
        ));
        assert!(error
            .to_string()
            .starts_with("External dependency unavailable"));
        assert!(!cache.path().join("tiny").join("config.toml").exists());
        assert!(!cache.path().join("tiny").join("config.part").exists());
    }

    #[test]
    fn test_fetch_io_failure() {
        let cache = tempfile::tempdir().unwrap();
        // the cache dir can't be created below a file
        let file = cache.path().join("file");
        fs::write(&file, "").unwrap();

        let hub = Hub::new("http://127.0.0.1:9", &file);
        assert!(matches!(hub.fetch("tiny"), Err(HubError::Io(_))));
    }
}
