//! Creates new sites, posts and categories on disk.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use url::Url;

use crate::config::{PerPage, Project, CONFIG_FILE, DEFAULT_THEME};
use crate::fs::{ASSETS_DIR, CATEGORY_META, PAGES_DIR, THEMES_DIR};

/// The category every new site starts with.
pub const DEFAULT_CATEGORY: &str = "default_category";

/// The bundled default theme, as (relative path, contents).
const DEFAULT_THEME_FILES: &[(&str, &str)] = &[
    ("index.html", include_str!("../themes/default/index.html")),
    ("category.html", include_str!("../themes/default/category.html")),
    ("single.html", include_str!("../themes/default/single.html")),
    ("page.html", include_str!("../themes/default/page.html")),
    ("404.html", include_str!("../themes/default/404.html")),
    ("500.html", include_str!("../themes/default/500.html")),
    ("css/style.css", include_str!("../themes/default/css/style.css")),
];

/// Settings for a new site.
pub struct SiteOptions {
    pub name: String,
    pub url: Url,
    pub desc: String,
    pub per_page: usize,
    pub theme: String,
}

/// Creates a site in `dir`: the project file, `assets/`, `pages/`, a first
/// category and, when the default theme is selected, the bundled theme.
/// Returns the path of the project file.
pub fn create_site(dir: &Path, options: &SiteOptions) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILE);
    if config_path.exists() {
        return Err(Error::Conflict(config_path));
    }

    let project = Project {
        site_dir: None,
        site_name: options.name.clone(),
        site_url: options.url.clone(),
        site_desc: options.desc.clone(),
        per_page: PerPage(options.per_page),
        theme: options.theme.clone(),
        themes_dir: None,
        search: false,
        build_dir: None,
    };
    for sub in &[ASSETS_DIR, PAGES_DIR, DEFAULT_CATEGORY] {
        fs::create_dir_all(dir.join(sub))?;
    }
    if options.theme == DEFAULT_THEME {
        let theme_dir = dir.join(THEMES_DIR).join(DEFAULT_THEME);
        for (name, contents) in DEFAULT_THEME_FILES {
            let path = theme_dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            if !path.exists() {
                fs::write(&path, contents)?;
            }
        }
    }
    fs::write(&config_path, serde_yaml::to_string(&project)?)?;
    info!("created site in {}", dir.display());
    Ok(config_path)
}

/// Turns a title into a file-name slug, e.g. "Hello, World!" becomes
/// `hello_world`.
pub fn slugify(title: &str) -> String {
    slug::slugify(title).replace('-', "_")
}

/// Writes a new post skeleton into `category` and returns its path. The post
/// is dated `now`.
pub fn new_post(
    site_dir: &Path,
    category: &str,
    title: &str,
    draft: bool,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let dir = site_dir.join(category);
    if !dir.is_dir() {
        return Err(Error::NotFound(dir));
    }
    let path = dir.join(format!("{}.md", slugify(title)));
    if path.exists() {
        return Err(Error::Conflict(path));
    }
    fs::write(
        &path,
        format!(
            "---\npublished_at: {}\ndraft: {}\n---\n\n# {}\n\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            draft,
            title
        ),
    )?;
    info!("created {}", path.display());
    Ok(path)
}

/// Creates a category directory named after `name` with a `meta.yaml`
/// holding the display name. Returns the new category's slug.
pub fn new_category(site_dir: &Path, name: &str) -> Result<String> {
    let slug = slugify(name);
    let dir = site_dir.join(&slug);
    if dir.exists() {
        return Err(Error::Conflict(dir));
    }
    fs::create_dir_all(&dir)?;
    let mut meta = serde_yaml::Mapping::new();
    meta.insert("name".into(), name.into());
    fs::write(dir.join(CATEGORY_META), serde_yaml::to_string(&meta)?)?;
    info!("created category `{}`", slug);
    Ok(slug)
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error creating site files.
#[derive(Debug)]
pub enum Error {
    /// Returned when the file or directory to create already exists.
    Conflict(PathBuf),

    /// Returned when the target category doesn't exist.
    NotFound(PathBuf),

    /// Returned when serializing YAML fails.
    Yaml(serde_yaml::Error),

    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Conflict(path) => write!(f, "'{}' already exists", path.display()),
            Error::NotFound(path) => write!(f, "'{}' does not exist", path.display()),
            Error::Yaml(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Conflict(_) | Error::NotFound(_) => None,
            Error::Yaml(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Error {
        Error::Yaml(err)
    }
}
