//! 单次 HTTP 请求封装。
//!
//! 不做重试、不设超时、不加自定义 Header；非 2xx 一律视为失败。

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use crate::repo::error::RepoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// 写类请求（POST）携带的请求体。
#[derive(Debug, Clone, Default)]
pub struct FetchBody {
    pub content_type: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new() -> Result<Self, RepoError> {
        // blocking 客户端默认 30 秒超时，这里显式关掉
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| RepoError::Config(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    /// 发送请求并读完响应体。
    pub fn fetch(
        &self,
        url: &Url,
        method: HttpMethod,
        body: Option<&FetchBody>,
    ) -> Result<FetchResponse, RepoError> {
        let resp = self.open(url, method, body)?;
        let status = resp.status().as_u16();
        let bytes = resp
            .bytes()
            .map_err(|e| RepoError::Transport(e.to_string()))?;
        debug!(target: "fetch", status, bytes = bytes.len(), "响应读取完成");
        Ok(FetchResponse {
            status,
            body: bytes.to_vec(),
        })
    }

    /// 发送请求，返回尚未读取的响应（供流式下载使用）。
    pub fn open(
        &self,
        url: &Url,
        method: HttpMethod,
        body: Option<&FetchBody>,
    ) -> Result<Response, RepoError> {
        debug!(target: "fetch", method = ?method, url = %url, "发送请求");
        let request = match method {
            HttpMethod::Get => self.client.get(url.clone()),
            HttpMethod::Post => {
                let body = body.cloned().unwrap_or_default();
                let mut req = self.client.post(url.clone());
                if !body.content_type.is_empty() {
                    req = req.header(CONTENT_TYPE, body.content_type);
                }
                req.body(body.body)
            }
        };
        let resp = request
            .send()
            .map_err(|e| RepoError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RepoError::FetchFailed {
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! 测试用的本地 HTTP 服务。

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, mpsc};
    use std::thread;
    use std::time::Duration;

    #[derive(Clone)]
    pub(crate) struct Route {
        pub status: u16,
        pub body: Vec<u8>,
        pub content_length: bool,
    }

    impl Route {
        pub(crate) fn html(body: impl Into<String>) -> Self {
            Self {
                status: 200,
                body: body.into().into_bytes(),
                content_length: true,
            }
        }

        pub(crate) fn bytes(body: Vec<u8>) -> Self {
            Self {
                status: 200,
                body,
                content_length: true,
            }
        }

        pub(crate) fn status(status: u16) -> Self {
            Self {
                status,
                body: Vec::new(),
                content_length: true,
            }
        }

        pub(crate) fn chunked(mut self) -> Self {
            self.content_length = false;
            self
        }
    }

    pub(crate) struct TestServer {
        pub base_url: String,
        pub hits: Arc<AtomicUsize>,
        shutdown: mpsc::Sender<()>,
    }

    impl TestServer {
        /// 路由按 path（不含 query）匹配；未命中返回 404。
        pub(crate) fn spawn(routes: HashMap<String, Route>) -> Self {
            let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
            let base_url = format!("http://{}", server.server_addr());
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&hits);
            let (shutdown, shutdown_rx) = mpsc::channel::<()>();
            thread::spawn(move || {
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                    let request = match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(req)) => req,
                        Ok(None) => continue,
                        Err(_) => break,
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                    let url = request.url().to_string();
                    let path = url.split('?').next().unwrap_or(&url).to_string();
                    let route = routes.get(&path).cloned().unwrap_or(Route::status(404));
                    let len = route.content_length.then_some(route.body.len());
                    let response = tiny_http::Response::new(
                        tiny_http::StatusCode(route.status),
                        Vec::new(),
                        std::io::Cursor::new(route.body),
                        len,
                        None,
                    );
                    let _ = request.respond(response);
                }
            });
            Self {
                base_url,
                hits,
                shutdown,
            }
        }

        pub(crate) fn url(&self, path: &str) -> url::Url {
            url::Url::parse(&format!("{}{}", self.base_url, path)).expect("test url")
        }

        pub(crate) fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            let _ = self.shutdown.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::test_server::{Route, TestServer};
    use super::*;

    #[test]
    fn fetch_returns_body_on_success() {
        let server = TestServer::spawn(HashMap::from([(
            "/page".to_string(),
            Route::html("<html>ok</html>"),
        )]));
        let fetcher = ContentFetcher::new().unwrap();
        let resp = fetcher
            .fetch(&server.url("/page?x=1"), HttpMethod::Get, None)
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), "<html>ok</html>");
    }

    #[test]
    fn non_success_status_is_fetch_failure() {
        let server = TestServer::spawn(HashMap::from([(
            "/gone".to_string(),
            Route::status(503),
        )]));
        let fetcher = ContentFetcher::new().unwrap();
        let err = fetcher
            .fetch(&server.url("/gone"), HttpMethod::Get, None)
            .unwrap_err();
        assert_eq!(err, RepoError::FetchFailed { status: 503 });
    }

    #[test]
    fn post_is_supported() {
        let server = TestServer::spawn(HashMap::from([(
            "/form".to_string(),
            Route::html("posted"),
        )]));
        let fetcher = ContentFetcher::new().unwrap();
        let body = FetchBody {
            content_type: "application/x-www-form-urlencoded".to_string(),
            body: String::new(),
        };
        let resp = fetcher
            .fetch(&server.url("/form"), HttpMethod::Post, Some(&body))
            .unwrap();
        assert_eq!(resp.text(), "posted");
    }

    #[test]
    fn slow_response_is_not_cut_off() {
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::thread;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            thread::sleep(Duration::from_secs(32));
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
            );
        });

        let fetcher = ContentFetcher::new().unwrap();
        let url = Url::parse(&format!("http://{addr}/slow")).unwrap();
        let resp = fetcher.fetch(&url, HttpMethod::Get, None).unwrap();
        assert_eq!(resp.text(), "ok");
        server.join().unwrap();
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let fetcher = ContentFetcher::new().unwrap();
        let url = Url::parse("http://127.0.0.1:9/nothing").unwrap();
        let err = fetcher.fetch(&url, HttpMethod::Get, None).unwrap_err();
        assert!(matches!(err, RepoError::Transport(_)));
    }
}
