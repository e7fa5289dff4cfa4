//! Filename and content sniffing used when a producer does not say what it sent.

use crate::TabType;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// Highlighting language for a filename, by special name first and extension second.
pub fn detect_language(filename: &str) -> Option<&'static str> {
    let path = Path::new(filename);
    let base = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match base.as_str() {
        "dockerfile" => return Some("dockerfile"),
        "makefile" => return Some("makefile"),
        ".gitignore" | ".dockerignore" => return Some("plaintext"),
        _ => {}
    }

    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())?;
    let language = match ext.as_str() {
        "go" => "go",
        "js" | "jsx" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "rb" => "ruby",
        "rs" => "rust",
        "java" => "java",
        "kt" => "kotlin",
        "swift" => "swift",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "sh" | "bash" | "zsh" => "bash",
        "fish" => "fish",
        "ps1" => "powershell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "less" => "less",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        "toml" => "toml",
        "ini" | "cfg" => "ini",
        "conf" => "nginx",
        "lua" => "lua",
        "pl" => "perl",
        "r" => "r",
        "m" => "matlab",
        "scala" => "scala",
        "ex" | "exs" => "elixir",
        "erl" => "erlang",
        "hs" => "haskell",
        "clj" => "clojure",
        "elm" => "elm",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => return None,
    };
    Some(language)
}

/// Picks a render type from the filename when there is one, then from the
/// content itself. Anything unrecognised renders as markdown.
pub fn detect_content_type(filename: Option<&str>, content: &str) -> TabType {
    if let Some(filename) = filename.filter(|name| !name.is_empty()) {
        let ext = Path::new(filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "md" | "markdown" => return TabType::Markdown,
            "diff" | "patch" => return TabType::Diff,
            "mmd" | "mermaid" => return TabType::Mermaid,
            "csv" => return TabType::Csv,
            ext if IMAGE_EXTENSIONS.contains(&ext) => return TabType::Image,
            _ => {}
        }
        if detect_language(filename).is_some() {
            return TabType::Code;
        }
    }

    if content.starts_with("diff ") || content.starts_with("--- ") || content.starts_with("+++ ")
    {
        return TabType::Diff;
    }
    TabType::Markdown
}
