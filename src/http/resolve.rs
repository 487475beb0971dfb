//! Maps a parsed request onto the document root.
//!
//! Produces a framed [`Response`] for files, listings and redirects, or a
//! [`Rejection`] naming the error status to answer with.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::context::{rfc1123, ServeContext};
use super::mime::lookup_mime;
use super::range::{parse_ranges, ByteRangeSet};
use super::request::Request;
use super::response::{Body, Content, FileBody, Response, Status};

/// A request that ends in an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: Status,
    /// Modification time of the resource, if it was found.
    pub mtime: Option<String>,
}

impl Rejection {
    const fn new(status: Status) -> Self {
        Self {
            status,
            mtime: None,
        }
    }

    fn with_mtime(status: Status, mtime: &str) -> Self {
        Self {
            status,
            mtime: Some(mtime.to_string()),
        }
    }
}

/// Resolve `req` against the document root.
pub fn resolve(ctx: &ServeContext<'_>, req: &Request) -> Result<Response, Rejection> {
    let fs_path = filesystem_path(ctx, &req.path);
    if req.path.ends_with(b"/") {
        serve_directory(ctx, req, fs_path)
    } else {
        serve_file(ctx, req, fs_path)
    }
}

/// Document root with the request path appended verbatim.
fn filesystem_path(ctx: &ServeContext<'_>, path: &[u8]) -> PathBuf {
    let mut raw = ctx.site.document_root.as_os_str().as_bytes().to_vec();
    raw.extend_from_slice(path);
    PathBuf::from(OsString::from_vec(raw))
}

fn open_error(e: &io::Error) -> Rejection {
    match e.kind() {
        io::ErrorKind::PermissionDenied => Rejection::new(Status::Forbidden),
        _ => Rejection::new(Status::NotFound),
    }
}

/// Open for reading without waiting on FIFOs or devices.
fn open_nonblocking(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(path)
}

fn serve_directory(
    ctx: &ServeContext<'_>,
    req: &Request,
    fs_path: PathBuf,
) -> Result<Response, Rejection> {
    let meta = fs::metadata(&fs_path).map_err(|e| open_error(&e))?;
    let mtime = rfc1123(meta.mtime());

    let listing = ctx
        .dir_cache
        .get(&fs_path, &req.path_lossy(), &mtime, ctx.now)
        .ok_or_else(|| Rejection::with_mtime(Status::Forbidden, &mtime))?;

    let not_modified = req.if_modified.as_deref() == Some(mtime.as_str());
    let status = if not_modified {
        Status::NotModified
    } else {
        Status::Ok
    };
    Ok(Response::content(
        ctx,
        status,
        Content {
            body: Body::Listing(listing),
            mime: "text/html",
            mtime: Some(mtime),
            ranges: ByteRangeSet::default(),
            head_only: req.head_only || not_modified,
        },
        req.keep_alive,
    ))
}

fn serve_file(ctx: &ServeContext<'_>, req: &Request, fs_path: PathBuf) -> Result<Response, Rejection> {
    let file = open_nonblocking(&fs_path).map_err(|e| open_error(&e))?;
    let meta = file.metadata().map_err(|e| {
        debug!("fstat {} failed: {}", fs_path.display(), e);
        Rejection::new(Status::InternalServerError)
    })?;

    let mut ranges = match req.range.as_deref() {
        Some(text) => parse_ranges(text, meta.len()).map_err(|e| {
            debug!("Rejecting range `{}`: {}", text, e);
            Rejection::new(e.status())
        })?,
        None => ByteRangeSet::default(),
    };

    if !meta.is_file() {
        if meta.is_dir() {
            let mut path = req.path.clone();
            path.push(b'/');
            return Ok(Response::redirect(
                ctx,
                &req.hostname,
                &path,
                req.keep_alive,
                req.head_only,
            ));
        }
        return Err(Rejection::new(Status::Forbidden));
    }

    let mime = lookup_mime(&fs_path);
    let mtime = rfc1123(meta.mtime());

    if req.if_range.as_deref().is_some_and(|v| v != mtime) {
        ranges.clear();
    }
    if req.if_unmodified.as_deref().is_some_and(|v| v != mtime) {
        return Err(Rejection::with_mtime(Status::PreconditionFailed, &mtime));
    }

    let mut head_only = req.head_only;
    let status = if req.if_modified.as_deref() == Some(mtime.as_str()) {
        ranges.clear();
        head_only = true;
        Status::NotModified
    } else if ranges.is_empty() {
        Status::Ok
    } else {
        Status::PartialContent
    };

    Ok(Response::content(
        ctx,
        status,
        Content {
            body: Body::File(FileBody {
                file,
                size: meta.len(),
            }),
            mime,
            mtime: Some(mtime),
            ranges,
            head_only,
        },
        req.keep_alive,
    ))
}
