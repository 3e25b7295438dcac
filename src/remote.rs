//! Minimal WebDAV client used for remote destinations.
//!
//! Only what a COPY/MOVE destination needs is implemented: a `PROPFIND`
//! (`Depth: 0`) existence check, `PUT`, `DELETE`, `MKCOL` and `PROPPATCH`.
//! Any non-2xx answer, including a failed entry inside a `207 Multi-Status`,
//! becomes [`Error::RemoteStatus`] carrying the DAV precondition if the server
//! named one.

use crate::error::{Error, Result};
use crate::store::DeadProperty;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use reqwest::{Body, Method, Response, StatusCode};
use std::fmt;
use url::Url;

const PROPFIND_RESOURCETYPE: &str = concat!(
    r#"<?xml version="1.0" encoding="utf-8"?>"#,
    r#"<D:propfind xmlns:D="DAV:"><D:prop><D:resourcetype/></D:prop></D:propfind>"#
);

/// Kind of an existing remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    /// Plain resource
    Document,
    /// Collection (`DAV:resourcetype` contains `DAV:collection`)
    Collection,
}

/// HTTP client speaking the WebDAV methods a transfer destination needs.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    /// Client with default reqwest settings.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(reqwest::Client::builder().build()?))
    }

    /// Wrap a configured reqwest client (timeouts, auth headers, TLS).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Probe `url`. Returns `None` when the server answers 404.
    pub async fn stat(&self, url: &Url) -> Result<Option<RemoteKind>> {
        let response = self
            .http
            .request(dav_method("PROPFIND")?, url.clone())
            .header("Depth", "0")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_RESOURCETYPE)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = check("PROPFIND", url, response).await?;
        if body.collection {
            Ok(Some(RemoteKind::Collection))
        } else {
            Ok(Some(RemoteKind::Document))
        }
    }

    /// Upload a document. Returns true if the server created a new resource.
    ///
    /// Every request carries the `Overwrite` header. With `overwrite` false it
    /// also carries `If-None-Match: *`, so servers that ignore `Overwrite` on
    /// PUT still answer 412 for an existing resource.
    pub async fn put(&self, url: &Url, body: Body, overwrite: bool) -> Result<bool> {
        let mut request = self
            .http
            .put(url.clone())
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .body(body);
        if !overwrite {
            request = request.header("If-None-Match", "*");
        }
        let response = request.send().await?;
        let created = response.status() == StatusCode::CREATED;
        check("PUT", url, response).await?;
        Ok(created)
    }

    /// Delete a resource (recursively for collections).
    pub async fn delete(&self, url: &Url) -> Result<()> {
        let response = self.http.delete(url.clone()).send().await?;
        check("DELETE", url, response).await.map(drop)
    }

    /// Create a collection.
    pub async fn mkcol(&self, url: &Url) -> Result<()> {
        let response = self
            .http
            .request(dav_method("MKCOL")?, url.clone())
            .send()
            .await?;
        check("MKCOL", url, response).await.map(drop)
    }

    /// Set dead properties. A no-op for an empty list.
    pub async fn proppatch(&self, url: &Url, properties: &[DeadProperty]) -> Result<()> {
        if properties.is_empty() {
            return Ok(());
        }
        let response = self
            .http
            .request(dav_method("PROPPATCH")?, url.clone())
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(propertyupdate(properties)?)
            .send()
            .await?;
        check("PROPPATCH", url, response).await.map(drop)
    }
}

fn dav_method(name: &'static str) -> Result<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|_| Error::NotSupported(name))
}

pub(crate) fn xml_error(e: impl fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

/// Turn a response into its parsed body, or an error for any failure status.
async fn check(method: &str, url: &Url, response: Response) -> Result<DavBody> {
    let status = response.status();
    let text = response.text().await?;
    let body = if text.trim().is_empty() {
        DavBody::default()
    } else {
        DavBody::parse(&text)?
    };
    let failed = if status.is_success() {
        body.statuses.iter().copied().find(|s| !s.is_success())
    } else {
        Some(status)
    };
    match failed {
        Some(status) => Err(Error::RemoteStatus {
            method: method.to_owned(),
            url: url.clone(),
            status,
            condition: body.condition,
        }),
        None => Ok(body),
    }
}

/// What a WebDAV response body says, reduced to what the client acts on.
#[derive(Debug, Default, PartialEq, Eq)]
struct DavBody {
    /// First child of a `DAV:error` root
    condition: Option<String>,
    /// Every `DAV:status` inside a multistatus
    statuses: Vec<StatusCode>,
    /// A `DAV:collection` resourcetype was reported
    collection: bool,
}

impl DavBody {
    fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut body = DavBody::default();
        let mut stack: Vec<String> = Vec::new();
        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => {
                    let name = local_name(&e)?;
                    body.observe(&stack, &name);
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = local_name(&e)?;
                    body.observe(&stack, &name);
                }
                Event::Text(e) => {
                    if stack.last().is_some_and(|n| n == "status") {
                        let line = e.unescape().map_err(xml_error)?;
                        if let Some(status) = parse_status_line(&line) {
                            body.statuses.push(status);
                        }
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(body)
    }

    fn observe(&mut self, stack: &[String], name: &str) {
        match stack {
            [root] if root == "error" && self.condition.is_none() => {
                self.condition = Some(name.to_owned());
            }
            [.., parent] if parent == "resourcetype" && name == "collection" => {
                self.collection = true;
            }
            _ => {}
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> Result<String> {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref())
        .map(str::to_owned)
        .map_err(xml_error)
}

/// Parse `HTTP/1.1 424 Failed Dependency` into its status code.
fn parse_status_line(line: &str) -> Option<StatusCode> {
    let code = line.split_whitespace().nth(1)?.parse::<u16>().ok()?;
    StatusCode::from_u16(code).ok()
}

/// Render a `DAV:propertyupdate` setting every property.
fn propertyupdate(properties: &[DeadProperty]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("D:propertyupdate").with_attributes([("xmlns:D", "DAV:")]),
        ))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("D:set")))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("D:prop")))
        .map_err(xml_error)?;

    for (i, property) in properties.iter().enumerate() {
        let (tag, xmlns) = if property.name.namespace == "DAV:" {
            (format!("D:{}", property.name.name), None)
        } else {
            (format!("p{i}:{}", property.name.name), Some(format!("xmlns:p{i}")))
        };
        let mut start = BytesStart::new(tag.as_str());
        if let Some(attr) = &xmlns {
            start.push_attribute((attr.as_str(), property.name.namespace.as_str()));
        }
        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        writer
            .write_event(Event::Text(BytesText::new(&property.value)))
            .map_err(xml_error)?;
        writer
            .write_event(Event::End(BytesEnd::new(tag.as_str())))
            .map_err(xml_error)?;
    }

    for tag in ["D:prop", "D:set", "D:propertyupdate"] {
        writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(xml_error)?;
    }
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}
