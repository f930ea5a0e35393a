//! Markdown documents on disk rendered through comrak into the page template.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use askama::Template;
use bytes::Bytes;
use comrak::{markdown_to_html, options::Options};
use tracing::debug;

use super::types::{RenderError, RenderPipeline, SourceDocument};
use crate::presentation::views::PageTemplate;

const INDEX_STEM: &str = "index";
const FRONT_MATTER_DELIMITER: &str = "---";

pub struct MarkdownPipeline {
    content_dir: PathBuf,
    content_ext: String,
    site_title: String,
    options: Options<'static>,
}

impl MarkdownPipeline {
    pub fn new(
        content_dir: impl Into<PathBuf>,
        content_ext: impl Into<String>,
        site_title: impl Into<String>,
    ) -> Self {
        Self {
            content_dir: content_dir.into(),
            content_ext: content_ext.into(),
            site_title: site_title.into(),
            options: default_options(),
        }
    }

    pub fn site_title(&self) -> &str {
        &self.site_title
    }

    fn document_path(&self, relative: &Path, stem: &str) -> PathBuf {
        self.content_dir
            .join(relative)
            .join(format!("{stem}{}", self.content_ext))
    }
}

impl RenderPipeline for MarkdownPipeline {
    /// `/` and `/dir/` resolve to `index` documents; `/a/b` resolves to
    /// `a/b.md`, falling back to `a/b/index.md`.
    fn resolve(&self, request_path: &str) -> Result<SourceDocument, RenderError> {
        let trimmed = request_path.trim_start_matches('/');
        let relative = Path::new(trimmed);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(RenderError::not_found(request_path));
        }

        if trimmed.is_empty() || trimmed.ends_with('/') {
            return Ok(SourceDocument::at(self.document_path(relative, INDEX_STEM)));
        }

        let (parent, stem) = match trimmed.rsplit_once('/') {
            Some((parent, stem)) => (Path::new(parent), stem),
            None => (Path::new(""), trimmed),
        };
        let direct = SourceDocument::at(self.document_path(parent, stem));
        if direct.exists {
            return Ok(direct);
        }

        let index = SourceDocument::at(self.document_path(relative, INDEX_STEM));
        if index.exists {
            return Ok(index);
        }
        Ok(SourceDocument::missing(direct.path))
    }

    fn render(&self, source: &SourceDocument) -> Result<Bytes, RenderError> {
        if !source.exists {
            return Err(RenderError::not_found(source.path.display().to_string()));
        }

        let markdown =
            fs::read_to_string(&source.path).map_err(|err| RenderError::read(&source.path, &err))?;
        let content = markdown_to_html(&markdown, &self.options);
        let title = document_title(&markdown).unwrap_or_else(|| self.site_title.clone());

        let page = PageTemplate {
            site_title: self.site_title.clone(),
            title,
            content,
        };
        let html = page
            .render()
            .map_err(|err| RenderError::template(err.to_string()))?;

        debug!(
            target = "pagegate::application::render::pipeline",
            op = "render",
            result = "ok",
            source_path = %source.path.display(),
            bytes = html.len(),
            "Rendered markdown document"
        );
        Ok(Bytes::from(html))
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.description_lists = true;
    ext.front_matter_delimiter = Some(FRONT_MATTER_DELIMITER.to_string());

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.tasklist_classes = true;
    render.r#unsafe = true;
    options
}

/// Title from a `title:` front matter key, else the first level-one heading.
fn document_title(markdown: &str) -> Option<String> {
    front_matter_title(markdown).or_else(|| {
        markdown
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|heading| heading.trim().to_string())
            .filter(|heading| !heading.is_empty())
    })
}

fn front_matter_title(markdown: &str) -> Option<String> {
    let mut lines = markdown.lines();
    if lines.next()?.trim_end() != FRONT_MATTER_DELIMITER {
        return None;
    }
    lines
        .take_while(|line| line.trim_end() != FRONT_MATTER_DELIMITER)
        .find_map(|line| line.strip_prefix("title:"))
        .map(|value| value.trim().trim_matches(['"', '\'']).to_string())
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn site() -> (TempDir, MarkdownPipeline) {
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("guides")).expect("guides dir");
        fs::write(root.join("index.md"), "# Home\n\nWelcome.").expect("index");
        fs::write(root.join("about.md"), "About us.").expect("about");
        fs::write(root.join("guides/index.md"), "# Guides").expect("guides index");
        fs::write(
            root.join("guides/setup.md"),
            "---\ntitle: \"Setting up\"\n---\n# Setup\n\n- [x] done",
        )
        .expect("setup");
        let pipeline = MarkdownPipeline::new(root, ".md", "Docs");
        (dir, pipeline)
    }

    #[test]
    fn resolves_root_to_index() {
        let (dir, pipeline) = site();
        let source = pipeline.resolve("/").expect("resolved");
        assert_eq!(source.path, dir.path().join("index.md"));
        assert!(source.exists);
    }

    #[test]
    fn resolves_nested_documents_and_directory_indexes() {
        let (dir, pipeline) = site();

        let setup = pipeline.resolve("/guides/setup").expect("setup");
        assert_eq!(setup.path, dir.path().join("guides/setup.md"));

        let guides = pipeline.resolve("/guides").expect("guides");
        assert_eq!(guides.path, dir.path().join("guides/index.md"));

        let trailing = pipeline.resolve("/guides/").expect("guides/");
        assert_eq!(trailing.path, dir.path().join("guides/index.md"));
    }

    #[test]
    fn unknown_document_resolves_as_missing() {
        let (dir, pipeline) = site();
        let source = pipeline.resolve("/nope").expect("resolved");
        assert!(!source.exists);
        assert_eq!(source.path, dir.path().join("nope.md"));
    }

    #[test]
    fn traversal_segments_are_rejected() {
        let (_dir, pipeline) = site();
        for path in ["/../secret", "/guides/../about", "/./about"] {
            let err = pipeline.resolve(path).expect_err("traversal");
            assert!(err.is_not_found(), "{path} should be rejected");
        }
    }

    #[test]
    fn renders_markdown_into_page_template() {
        let (_dir, pipeline) = site();
        let source = pipeline.resolve("/guides/setup").expect("resolved");
        let html = String::from_utf8(pipeline.render(&source).expect("rendered").to_vec())
            .expect("utf8");

        assert!(html.contains("<title>Setting up · Docs</title>"));
        assert!(html.contains("<h1>Setup</h1>"));
        assert!(!html.contains("title: "));
    }

    #[test]
    fn title_falls_back_to_heading_then_site_title() {
        let (_dir, pipeline) = site();

        let home = pipeline.resolve("/").expect("home");
        let html = String::from_utf8(pipeline.render(&home).expect("home").to_vec()).expect("utf8");
        assert!(html.contains("<title>Home · Docs</title>"));

        let about = pipeline.resolve("/about").expect("about");
        let html =
            String::from_utf8(pipeline.render(&about).expect("about").to_vec()).expect("utf8");
        assert!(html.contains("<title>Docs · Docs</title>"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let (_dir, pipeline) = site();
        let source = pipeline.resolve("/about").expect("resolved");
        assert_eq!(
            pipeline.render(&source).expect("first"),
            pipeline.render(&source).expect("second")
        );
    }

    #[test]
    fn rendering_missing_source_is_not_found() {
        let (_dir, pipeline) = site();
        let source = pipeline.resolve("/nope").expect("resolved");
        assert!(pipeline.render(&source).expect_err("missing").is_not_found());
    }
}
