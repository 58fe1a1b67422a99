//! 单本书的结构化元数据。

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use url::Url;

use crate::base_system::book_paths;

/// 详情页能识别的标签，按前缀匹配，顺序即优先级。
const TITLE: &str = "Title";
const AUTHOR: &str = "Author";
const PUBLISHER: &str = "Publisher";
const ISBN: &str = "ISBN";
const ID: &str = "ID";
const SIZE: &str = "Size";
const YEAR: &str = "Year";
const EDITION: &str = "Edition";
const EXTENSION: &str = "Extension";
const PAGES: &str = "Pages";
const LANGUAGE: &str = "Language";
const SERIES: &str = "Series";
const VOLUME: &str = "Volume";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookRecord {
    pub title: String,
    pub id: String,
    pub author: String,
    pub publisher: String,
    pub isbn: String,
    pub year: String,
    pub series: String,
    pub size: String,
    pub extension: String,
    pub edition: String,
    pub volume: String,
    pub language: String,
    pub pages: String,
    pub synopsis: String,
    pub url: Option<Url>,
    pub cover: Option<Url>,
    pub mirrors: HashMap<String, Url>,
    /// 未识别的标签 → 值
    pub extra: BTreeMap<String, String>,
}

impl BookRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把一个 (label, value) 放进对应字段；未识别且非空的放进 `extra`。
    pub fn fill(&mut self, label: &str, value: &str) {
        let slot = match label {
            l if l.starts_with(TITLE) => &mut self.title,
            l if l.starts_with(AUTHOR) => &mut self.author,
            l if l.starts_with(PUBLISHER) => &mut self.publisher,
            l if l.starts_with(ISBN) => &mut self.isbn,
            l if l.starts_with(ID) => &mut self.id,
            l if l.starts_with(SIZE) => &mut self.size,
            l if l.starts_with(YEAR) => &mut self.year,
            l if l.starts_with(EDITION) => &mut self.edition,
            l if l.starts_with(EXTENSION) => &mut self.extension,
            l if l.starts_with(PAGES) => &mut self.pages,
            l if l.starts_with(LANGUAGE) => &mut self.language,
            l if l.starts_with(SERIES) => &mut self.series,
            l if l.starts_with(VOLUME) => &mut self.volume,
            _ => {
                if !label.is_empty() && !value.is_empty() {
                    self.extra.insert(label.to_string(), value.to_string());
                }
                return;
            }
        };
        *slot = value.to_string();
    }

    /// 同名镜像只保留第一次出现的地址。
    pub fn add_mirror(&mut self, name: &str, url: Url) {
        self.mirrors.entry(name.to_string()).or_insert(url);
    }

    /// 镜像名按字母序，便于界面稳定展示。
    pub fn mirror_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mirrors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn file_path_in(&self, dir: &Path) -> PathBuf {
        book_paths::book_file_path(dir, &self.title, &self.extension)
    }

    pub fn citation_path_in(&self, dir: &Path) -> PathBuf {
        book_paths::citation_file_path(dir, &self.title)
    }

    /// BibTeX 引用；空字段输出 `{}`，非 ASCII 字符替换为 `?`。
    pub fn to_bib(&self) -> String {
        let url = self.url.as_ref().map(Url::as_str).unwrap_or_default();
        let fields = [
            ("title", self.title.as_str()),
            ("author", &self.author),
            ("publisher", &self.publisher),
            ("isbn", &self.isbn),
            ("year", &self.year),
            ("series", &self.series),
            ("edition", &self.edition),
            ("volume", &self.volume),
            ("url", url),
        ];
        let mut out = format!("@book{{book:{},\n", ascii(&self.id));
        for (name, value) in fields {
            out.push_str(&format!("{name:<13}=    {{{}}},\n", ascii(value)));
        }
        out.push('}');
        out
    }
}

fn ascii(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_routes_known_labels_by_prefix() {
        let mut book = BookRecord::new();
        book.fill("Author(s):", "Knuth");
        book.fill("ISBN:", "0201896834");
        book.fill("ID:", "42");
        book.fill("Extension:", "djvu");
        book.fill("Language:", "English");
        book.fill("Periodical:", "");
        book.fill("Library:", "Kolxo3");
        assert_eq!(book.author, "Knuth");
        assert_eq!(book.isbn, "0201896834");
        assert_eq!(book.id, "42");
        assert_eq!(book.extension, "djvu");
        assert_eq!(book.language, "English");
        assert_eq!(book.extra.len(), 1);
        assert_eq!(book.extra.get("Library:").map(String::as_str), Some("Kolxo3"));
    }

    #[test]
    fn known_label_never_lands_in_extra() {
        let mut book = BookRecord::new();
        book.fill("Title:", "First");
        book.fill("Title (alt):", "Second");
        assert_eq!(book.title, "Second");
        assert!(book.extra.is_empty());
    }

    #[test]
    fn duplicate_mirror_keeps_first() {
        let mut book = BookRecord::new();
        book.add_mirror("A", Url::parse("http://a.example/1").unwrap());
        book.add_mirror("A", Url::parse("http://a.example/2").unwrap());
        assert_eq!(book.mirrors.len(), 1);
        assert_eq!(book.mirrors["A"].as_str(), "http://a.example/1");
    }

    #[test]
    fn bib_renders_empty_fields_as_braces() {
        let mut book = BookRecord::new();
        book.id = "7".to_string();
        book.title = "Café Society".to_string();
        book.url = Some(Url::parse("http://lib.example/book/index.php?md5=ab").unwrap());
        let bib = book.to_bib();
        assert!(bib.starts_with("@book{book:7,\n"));
        assert!(bib.contains("title        =    {Caf? Society},"));
        assert!(bib.contains("author       =    {},"));
        assert!(bib.contains("url          =    {http://lib.example/book/index.php?md5=ab},"));
        assert!(bib.ends_with("\n}"));
        assert!(bib.is_ascii());
    }

    #[test]
    fn paths_follow_title_and_extension() {
        let mut book = BookRecord::new();
        book.title = "Clean Code: A Handbook".to_string();
        book.extension = "PDF".to_string();
        let dir = Path::new("/books");
        assert_eq!(book.file_path_in(dir), dir.join("clean-code-a-handbook.pdf"));
        assert_eq!(book.citation_path_in(dir), dir.join("clean-code-a-handbook.bib"));
    }
}
