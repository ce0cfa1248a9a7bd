//! Server-side paging and next-links.

use crate::edm::EntityType;
use crate::statement::StatementBuilder;

/// Paging facts of the statement that selected a page of roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// Whether server-side paging limited the statement.
    pub serverside: bool,
    /// Effective row limit.
    pub top: Option<u32>,
    /// Configured page size of the type.
    pub page_size: u32,
}

impl PageInfo {
    /// Captures the paging facts of `builder`.
    pub fn of(builder: &dyn StatementBuilder, ty: &EntityType) -> Self {
        Self {
            serverside: builder.is_serverside_paging(),
            top: builder.top(),
            page_size: builder.page_size(ty),
        }
    }
}

/// Returns the continuation link for a page, if one is due.
///
/// A link is produced only when server-side paging is on and the page came
/// back exactly full. It is `request_uri` without `$skip`/`$skiptoken`,
/// followed by a `$skip` advanced by one page.
pub fn next_link(request_uri: &str, root_count: usize, page: &PageInfo, current_skip: u32) -> Option<String> {
    if !page.serverside || root_count == 0 || root_count != page.page_size as usize {
        return None;
    }
    let step = page.top.filter(|t| *t > 0).unwrap_or(page.page_size);
    let skip = current_skip.saturating_add(step);

    let (path, query) = request_uri.split_once('?').unwrap_or((request_uri, ""));
    let mut options: Vec<&str> = query
        .split('&')
        .filter(|option| {
            let name = option.split('=').next().unwrap_or("");
            !option.is_empty() && name != "$skip" && name != "$skiptoken"
        })
        .collect();
    let skip_option = format!("$skip={skip}");
    options.push(&skip_option);
    Some(format!("{path}?{}", options.join("&")))
}
