//! Aggregation of per-item results into one WebDAV response.
//!
//! `ParentFailed` entries are implied by an ancestor's failure and `Ignored`
//! entries were never attempted, so neither is reported. The rest is grouped
//! by [`ActionStatus`]. A single group becomes a plain status response; two or
//! more become a `207 Multi-Status` document with one `<D:response>` per group.
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <D:multistatus xmlns:D="DAV:">
//!   <D:response>
//!     <D:href>http://host/dst/a.txt</D:href>
//!     <D:href>http://host/dst/b.txt</D:href>
//!     <D:status>HTTP/1.1 201 Created</D:status>
//!   </D:response>
//!   ...
//! </D:multistatus>
//! ```

use crate::error::Result;
use crate::remote::xml_error;
use crate::result::{ActionResult, ActionStatus};
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Response, StatusCode, Version};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::BTreeMap;
use url::Url;

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Rendered outcome of a COPY or MOVE request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DavResponse {
    /// Every reported item shares one status
    Status {
        /// Response status
        status: StatusCode,
        /// DAV `<error>` body, if the status names a condition
        body: Option<String>,
    },
    /// Items ended with different statuses
    MultiStatus(String),
}

impl DavResponse {
    /// HTTP status of the response.
    pub fn status(&self) -> StatusCode {
        match self {
            DavResponse::Status { status, .. } => *status,
            DavResponse::MultiStatus(_) => StatusCode::MULTI_STATUS,
        }
    }

    /// XML body, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            DavResponse::Status { body, .. } => body.as_deref(),
            DavResponse::MultiStatus(body) => Some(body),
        }
    }

    /// Returns true for a `207 Multi-Status` response.
    pub fn is_multistatus(&self) -> bool {
        matches!(self, DavResponse::MultiStatus(_))
    }

    /// Convert into an [`http::Response`].
    pub fn into_response(self) -> Response<String> {
        let status = self.status();
        let body = match self {
            DavResponse::Status { body, .. } => body,
            DavResponse::MultiStatus(body) => Some(body),
        };
        let has_body = body.is_some();
        let mut response = Response::new(body.unwrap_or_default());
        *response.status_mut() = status;
        if has_body {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE));
        }
        response
    }
}

#[derive(Default)]
struct Group<'a> {
    hrefs: Vec<&'a Url>,
    errors: Vec<String>,
}

/// Aggregate `results` into a response for a request made with `version`.
///
/// When every reported item shares one status the response is that plain
/// status, however many hrefs carry it; a 207 is only produced for two or
/// more distinct statuses. Never fails for heterogeneous outcomes; an error
/// means the XML writer failed.
pub fn evaluate<'a>(
    results: impl IntoIterator<Item = &'a ActionResult>,
    version: Version,
) -> Result<DavResponse> {
    let mut groups: BTreeMap<ActionStatus, Group<'a>> = BTreeMap::new();
    for result in results {
        if matches!(
            result.status,
            ActionStatus::ParentFailed | ActionStatus::Ignored
        ) {
            continue;
        }
        let group = groups.entry(result.status).or_default();
        group.hrefs.push(&result.href);
        if let Some(error) = &result.error {
            group.errors.push(format!("{}: {error}", result.href));
        }
    }

    if groups.len() > 1 {
        return multistatus(&groups, version).map(DavResponse::MultiStatus);
    }
    let Some((status, _)) = groups.into_iter().next() else {
        return Ok(DavResponse::Status {
            status: StatusCode::NO_CONTENT,
            body: None,
        });
    };
    let body = match status {
        ActionStatus::PropSetFailed => Some(error_body()?),
        _ => None,
    };
    Ok(DavResponse::Status {
        status: status
            .status_code()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        body,
    })
}

fn status_line(version: Version, code: StatusCode) -> String {
    format!(
        "{version:?} {} {}",
        code.as_u16(),
        code.canonical_reason().unwrap_or_default()
    )
}

fn text_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(xml_error)?;
    Ok(())
}

fn preserved_live_properties(writer: &mut Writer<Vec<u8>>, root: bool) -> Result<()> {
    let mut start = BytesStart::new("D:error");
    if root {
        start.push_attribute(("xmlns:D", "DAV:"));
    }
    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    writer
        .write_event(Event::Empty(BytesStart::new("D:preserved-live-properties")))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("D:error")))
        .map_err(xml_error)?;
    Ok(())
}

fn error_body() -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;
    preserved_live_properties(&mut writer, true)?;
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn multistatus(groups: &BTreeMap<ActionStatus, Group<'_>>, version: Version) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("D:multistatus").with_attributes([("xmlns:D", "DAV:")]),
        ))
        .map_err(xml_error)?;

    for (status, group) in groups {
        let Some(code) = status.status_code() else {
            continue;
        };
        writer
            .write_event(Event::Start(BytesStart::new("D:response")))
            .map_err(xml_error)?;
        for href in &group.hrefs {
            text_element(&mut writer, "D:href", href.as_str())?;
        }
        text_element(&mut writer, "D:status", &status_line(version, code))?;
        if *status == ActionStatus::PropSetFailed {
            preserved_live_properties(&mut writer, false)?;
        }
        if !group.errors.is_empty() {
            text_element(&mut writer, "D:responsedescription", &group.errors.join("; "))?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("D:response")))
            .map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("D:multistatus")))
        .map_err(xml_error)?;
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}
