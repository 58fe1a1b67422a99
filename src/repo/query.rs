//! 搜索请求与 URL 构造。
//!
//! 仓库只声明字段名（`QueryFields`），这里负责把 `SearchQuery` 填进去。
//! 没有网络与解析副作用。

use std::collections::BTreeMap;

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortMode {
    Asc,
    Desc,
}

/// 一次搜索/翻页请求。创建后不再修改，翻页时生成新的实例。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    term: String,
    page: u32,
    sort: Option<String>,
    sort_mode: Option<SortMode>,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            page: 1,
            sort: None,
            sort_mode: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, mode: Option<SortMode>) -> Self {
        let field = field.into();
        if field.trim().is_empty() {
            return self;
        }
        self.sort = Some(field);
        self.sort_mode = mode;
        self
    }

    /// 同一检索条件的另一页。
    pub fn for_page(&self, page: u32) -> Self {
        self.clone().with_page(page)
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn sort(&self) -> Option<&str> {
        self.sort.as_deref()
    }

    pub fn sort_mode(&self) -> Option<SortMode> {
        self.sort_mode
    }
}

/// 仓库特有的查询字段名。
#[derive(Debug, Clone)]
pub struct QueryFields {
    pub query: &'static str,
    pub page: &'static str,
    /// 为空表示该仓库不支持排序。
    pub sort: Option<&'static str>,
    pub sort_mode: Option<&'static str>,
    pub sort_mode_values: [(SortMode, &'static str); 2],
    /// 固定附加参数；与上面已写入的字段同名时以请求值为准。
    pub extra: BTreeMap<&'static str, &'static str>,
}

pub fn build_url(base: &Url, fields: &QueryFields, query: &SearchQuery) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    let mut written: Vec<&str> = Vec::with_capacity(4 + fields.extra.len());
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(fields.query, query.term());
        written.push(fields.query);

        pairs.append_pair(fields.page, &query.page().to_string());
        written.push(fields.page);

        if let (Some(sort_field), Some(sort)) = (fields.sort, query.sort()) {
            pairs.append_pair(sort_field, sort);
            written.push(sort_field);
            if let (Some(mode_field), Some(mode)) = (fields.sort_mode, query.sort_mode())
                && let Some((_, value)) = fields.sort_mode_values.iter().find(|(m, _)| *m == mode)
            {
                pairs.append_pair(mode_field, value);
                written.push(mode_field);
            }
        }

        for (key, value) in &fields.extra {
            if !written.contains(key) {
                pairs.append_pair(key, value);
            }
        }
    }
    url
}
