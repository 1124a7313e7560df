use std::io::{self, Cursor, Write};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::title_cache::NodeTitleCache;
use super::wire::{error_for_status, ErrorBody, FileList, RootIds, NODES_PATH};
use crate::attr::NodeAttr;
use crate::connection::{CommitWrite, FileMode, FileStream, IndexQuery, IndexResult, NotebookConnection};
use crate::error::{NotebookError, Result};
use crate::paths::check_filename;

const TIMEOUT: Duration = Duration::from_secs(60);

/// Client for a notebook served by [`super::NotebookServer`].
///
/// The URL given to `connect` is the notebook base, e.g.
/// `http://localhost:8000/notebook/`.
pub struct HttpConnection {
    base: Option<Url>,
    client: Client,
    titles: NodeTitleCache,
}

impl Default for HttpConnection {
    fn default() -> Self {
        HttpConnection::new()
    }
}

impl HttpConnection {
    pub fn new() -> HttpConnection {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        HttpConnection {
            base: None,
            client,
            titles: NodeTitleCache::new(),
        }
    }

    fn base(&self) -> Result<&Url> {
        self.base
            .as_ref()
            .ok_or_else(|| NotebookError::Connection("connect() has not been called".into()))
    }

    /// `<base>/nodes/<nodeid>[/<filename>]` with each part escaped.
    fn node_url(&self, nodeid: &str, filename: Option<&str>) -> Result<Url> {
        let mut url = self.base()?.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| NotebookError::Connection("notebook URL cannot be a base".into()))?;
            segments.pop_if_empty().push(NODES_PATH).push(nodeid);
            if let Some(filename) = filename {
                let relative = filename.trim_start_matches('/');
                if relative.is_empty() {
                    segments.push("");
                } else {
                    segments.extend(relative.split('/'));
                }
            }
        }
        Ok(url)
    }

    /// `<base>/?<command>`
    fn command_url(&self, command: &str) -> Result<Url> {
        let mut url = self.base()?.clone();
        url.set_query(Some(command));
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .map_err(|e| NotebookError::Connection(format!("request failed: {}", e)))?;
        check(response)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "notebook request");
        self.client.request(method, url)
    }

    fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .map_err(|e| NotebookError::Connection(format!("unexpected response: {}", e)))
    }

    /// True for 200, false for 404, an error otherwise.
    fn exists(&self, url: Url) -> Result<bool> {
        let response = self
            .request(Method::HEAD, url)
            .send()
            .map_err(|e| NotebookError::Connection(format!("request failed: {}", e)))?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(error_for_status(s, "HEAD failed".into())),
        }
    }

    /// Sends an index query without consulting the title cache.
    pub fn index_raw(&self, query: &IndexQuery) -> Result<IndexResult> {
        let url = self.command_url("index")?;
        let response = self.send(self.request(Method::POST, url).json(&query.to_wire()))?;
        let value: Value = Self::json(response)?;
        IndexResult::from_wire(query, &value)
    }

    /// Remote URL of an attached file.
    pub fn get_file(&self, nodeid: &str, filename: &str) -> Result<String> {
        Ok(self.node_url(nodeid, Some(filename))?.to_string())
    }

    /// Asks the server to stop. Only honoured from localhost.
    pub fn shutdown_server(&self) -> Result<()> {
        let url = self.command_url("shutdown")?;
        self.send(self.request(Method::POST, url))?;
        Ok(())
    }
}

/// Turns an error status into the matching [`NotebookError`].
fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(body.into_error(status)),
        Err(_) => Err(error_for_status(status, text)),
    }
}

/// Buffers a file write and uploads it on commit.
struct HttpWriter {
    client: Client,
    url: Url,
    buf: Vec<u8>,
}

impl Write for HttpWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommitWrite for HttpWriter {
    fn commit(self: Box<Self>) -> Result<()> {
        let HttpWriter { client, url, buf } = *self;
        let response = client
            .post(url)
            .body(buf)
            .send()
            .map_err(|e| NotebookError::Connection(format!("request failed: {}", e)))?;
        check(response).map(|_| ())
    }
}

impl NotebookConnection for HttpConnection {
    fn connect(&mut self, url: &str) -> Result<()> {
        let mut base = Url::parse(url).map_err(|e| NotebookError::Connection(format!("bad URL '{}': {}", url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        self.base = Some(base);
        self.titles.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.titles.clear();
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let url = self.command_url("save")?;
        self.send(self.request(Method::POST, url))?;
        Ok(())
    }

    fn create_node(&mut self, nodeid: &str, attr: &NodeAttr) -> Result<()> {
        let url = self.node_url(nodeid, None)?;
        self.send(self.request(Method::POST, url).json(attr))?;
        let mut attr = attr.clone();
        attr.insert("nodeid", nodeid);
        self.titles.update_attr(&attr);
        Ok(())
    }

    fn read_node(&mut self, nodeid: &str) -> Result<NodeAttr> {
        let url = self.node_url(nodeid, None)?;
        let attr: NodeAttr = Self::json(self.send(self.request(Method::GET, url))?)?;
        self.titles.update_attr(&attr);
        Ok(attr)
    }

    fn update_node(&mut self, nodeid: &str, attr: &NodeAttr) -> Result<()> {
        let url = self.node_url(nodeid, None)?;
        self.send(self.request(Method::PUT, url).json(attr))?;
        let mut attr = attr.clone();
        attr.insert("nodeid", nodeid);
        self.titles.update_attr(&attr);
        Ok(())
    }

    fn delete_node(&mut self, nodeid: &str) -> Result<()> {
        let url = self.node_url(nodeid, None)?;
        self.send(self.request(Method::DELETE, url))?;
        // The subtree went too; refetch titles on the next search.
        self.titles.clear();
        Ok(())
    }

    fn has_node(&mut self, nodeid: &str) -> Result<bool> {
        if nodeid.is_empty() {
            return Ok(false);
        }
        let url = self.node_url(nodeid, None)?;
        self.exists(url)
    }

    fn get_rootid(&mut self) -> Result<String> {
        let url = self.node_url("", None)?;
        let roots: RootIds = Self::json(self.send(self.request(Method::GET, url))?)?;
        roots
            .rootids
            .into_iter()
            .next()
            .ok_or_else(|| NotebookError::UnknownNode("notebook has no root node".into()))
    }

    fn move_node(&mut self, nodeid: &str, parentid: &str, index: Option<usize>) -> Result<()> {
        let mut url = self.node_url(nodeid, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("move", parentid);
            if let Some(index) = index {
                query.append_pair("index", &index.to_string());
            }
        }
        self.send(self.request(Method::POST, url))?;
        Ok(())
    }

    fn open_file(&mut self, nodeid: &str, filename: &str, mode: FileMode) -> Result<FileStream> {
        check_filename(filename)?;
        if filename.ends_with('/') || filename.trim_start_matches('/').is_empty() {
            return Err(NotebookError::file(nodeid, filename, "is a directory"));
        }
        let mut url = self.node_url(nodeid, Some(filename))?;
        match mode {
            FileMode::Read => {
                let response = self.send(self.request(Method::GET, url))?;
                let data = response
                    .bytes()
                    .map_err(|e| NotebookError::file(nodeid, filename, e))?;
                Ok(FileStream::reader(Cursor::new(data.to_vec())))
            }
            FileMode::Write | FileMode::Append => {
                if mode == FileMode::Append {
                    url.set_query(Some("mode=a"));
                }
                Ok(FileStream::writer(HttpWriter {
                    client: self.client.clone(),
                    url,
                    buf: Vec::new(),
                }))
            }
        }
    }

    fn delete_file(&mut self, nodeid: &str, filename: &str) -> Result<()> {
        let url = self.node_url(nodeid, Some(filename))?;
        self.send(self.request(Method::DELETE, url))?;
        Ok(())
    }

    fn create_dir(&mut self, nodeid: &str, filename: &str) -> Result<()> {
        if !filename.ends_with('/') {
            return Err(NotebookError::File(format!(
                "directory name '{}' must end with '/'",
                filename
            )));
        }
        let url = self.node_url(nodeid, Some(filename))?;
        self.send(self.request(Method::PUT, url))?;
        Ok(())
    }

    fn list_dir(&mut self, nodeid: &str, filename: &str) -> Result<Vec<String>> {
        if !filename.ends_with('/') && !filename.is_empty() {
            return Err(NotebookError::File(format!(
                "filename '{}' does not end with '/'",
                filename
            )));
        }
        let url = self.node_url(nodeid, Some(filename))?;
        let list: FileList = Self::json(self.send(self.request(Method::GET, url))?)?;
        Ok(list.files)
    }

    fn has_file(&mut self, nodeid: &str, filename: &str) -> Result<bool> {
        let url = self.node_url(nodeid, Some(filename))?;
        self.exists(url)
    }

    fn index(&mut self, query: &IndexQuery) -> Result<IndexResult> {
        match query {
            IndexQuery::SearchTitles(text) => {
                if !self.titles.is_complete() {
                    let all = self.index_raw(&IndexQuery::SearchTitles(String::new()))?;
                    for (nodeid, title) in all.into_pairs() {
                        self.titles.add(&nodeid, &title);
                    }
                    self.titles.set_complete(true);
                }
                Ok(IndexResult::Pairs(self.titles.get(text)))
            }
            other => self.index_raw(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> HttpConnection {
        let mut conn = HttpConnection::new();
        conn.connect("http://localhost:8000/notebook").unwrap();
        conn
    }

    #[test]
    fn test_node_urls_escape_parts() {
        let conn = connected();
        assert_eq!(
            conn.node_url("n1", None).unwrap().as_str(),
            "http://localhost:8000/notebook/nodes/n1"
        );
        assert_eq!(
            conn.node_url("a/b", Some("dir/my file.txt")).unwrap().as_str(),
            "http://localhost:8000/notebook/nodes/a%2Fb/dir/my%20file.txt"
        );
        assert_eq!(
            conn.node_url("n1", Some("/")).unwrap().as_str(),
            "http://localhost:8000/notebook/nodes/n1/"
        );
        assert_eq!(
            conn.node_url("", None).unwrap().as_str(),
            "http://localhost:8000/notebook/nodes/"
        );
    }

    #[test]
    fn test_command_url() {
        let conn = connected();
        assert_eq!(
            conn.command_url("save").unwrap().as_str(),
            "http://localhost:8000/notebook/?save"
        );
    }

    #[test]
    fn test_requires_connect() {
        let mut conn = HttpConnection::new();
        assert!(matches!(conn.read_node("n1"), Err(NotebookError::Connection(_))));
    }
}
