//! HTML index pages for directories.

use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::http::context::rfc1123;
use crate::http::quote::{html_escape, quote};
use crate::http::MAX_PATH;

struct Item {
    name: Vec<u8>,
    is_dir: bool,
    size: u64,
    mtime: i64,
}

/// Render the listing of `fs_path`, titled with `url_path`.
///
/// Hidden entries are skipped; directories sort before files, then by name.
pub fn render_directory(fs_path: &Path, url_path: &str) -> io::Result<String> {
    let mut items = Vec::new();
    for entry in fs::read_dir(fs_path)? {
        let entry = entry?;
        let name = entry.file_name().as_bytes().to_vec();
        if name.first() == Some(&b'.') {
            continue;
        }
        // Entries that vanish or cannot be stat'ed are left out.
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        items.push(Item {
            name,
            is_dir: meta.is_dir(),
            size: meta.len(),
            mtime: meta.mtime(),
        });
    }
    items.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

    let title = html_escape(url_path);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n<h1>Index of {title}</h1>\n<hr>\n<pre>\n"
    );
    if url_path != "/" {
        html.push_str("<a href=\"../\">../</a>\n");
    }
    for item in &items {
        let mut href = quote(&item.name, MAX_PATH * 3);
        let mut label = html_escape(&String::from_utf8_lossy(&item.name));
        if item.is_dir {
            href.push('/');
            label.push('/');
        }
        let size = if item.is_dir {
            "-".to_string()
        } else {
            item.size.to_string()
        };
        html.push_str(&format!(
            "<a href=\"{href}\">{label}</a>  {}  {size}\n",
            rfc1123(item.mtime)
        ));
    }
    html.push_str("</pre>\n<hr>\n</body>\n</html>\n");
    Ok(html)
}
