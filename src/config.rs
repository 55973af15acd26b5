//! Loads the site configuration from `portico.yaml`.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// The name of the project file at the root of every site.
pub const CONFIG_FILE: &str = "portico.yaml";

/// The default build directory, relative to the site directory.
pub const BUILD_DIR: &str = ".build";

pub const DEFAULT_THEME: &str = "default";

/// The number of posts per index page. 0 disables pagination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerPage(pub usize);

impl Default for PerPage {
    fn default() -> Self {
        PerPage(10)
    }
}

fn default_theme() -> String {
    DEFAULT_THEME.to_owned()
}

/// The on-disk shape of `portico.yaml`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Project {
    /// Defaults to the directory holding the project file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_dir: Option<PathBuf>,

    pub site_name: String,

    pub site_url: Url,

    #[serde(default)]
    pub site_desc: String,

    #[serde(default)]
    pub per_page: PerPage,

    #[serde(default = "default_theme")]
    pub theme: String,

    /// Defaults to `<site_dir>/themes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub themes_dir: Option<PathBuf>,

    /// Whether to write a search index.
    #[serde(default)]
    pub search: bool,

    /// Defaults to `<site_dir>/.build`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_dir: Option<PathBuf>,
}

/// Everything the builder needs to know about a site, with all paths
/// resolved.
#[derive(Clone, Debug)]
pub struct Config {
    pub site_dir: PathBuf,
    pub build_dir: PathBuf,

    /// The directory holding the selected theme's templates.
    pub theme_dir: PathBuf,

    pub site_name: String,
    pub site_url: Url,
    pub site_desc: String,
    pub per_page: usize,
    pub theme: String,
    pub search: bool,
}

impl Config {
    /// Finds `portico.yaml` in `dir` or the nearest parent directory that
    /// has one, and loads it.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        for ancestor in dir.ancestors() {
            let path = ancestor.join(CONFIG_FILE);
            if path.is_file() {
                return Config::from_project_file(&path);
            }
        }
        Err(Error::NotFound(dir.to_owned()))
    }

    /// Loads a specific project file.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let file = File::open(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        let project: Project = serde_yaml::from_reader(file)?;
        let root = match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
            Some(parent) => parent,
            None => Path::new("."),
        };
        Ok(Config::from_project(project, root))
    }

    /// Resolves a [`Project`] whose file lives in `root`.
    pub fn from_project(project: Project, root: &Path) -> Config {
        let site_dir = match project.site_dir {
            Some(dir) => root.join(dir),
            None => root.to_owned(),
        };
        let themes_dir = match project.themes_dir {
            Some(dir) => root.join(dir),
            None => site_dir.join(crate::fs::THEMES_DIR),
        };
        let build_dir = match project.build_dir {
            Some(dir) => root.join(dir),
            None => site_dir.join(BUILD_DIR),
        };
        Config {
            theme_dir: themes_dir.join(&project.theme),
            build_dir,
            site_dir,
            site_name: project.site_name,
            site_url: project.site_url,
            site_desc: project.site_desc,
            per_page: project.per_page.0,
            theme: project.theme,
            search: project.search,
        }
    }

    /// The site URL without a trailing slash, ready to have root-relative
    /// paths appended.
    pub fn base_url(&self) -> &str {
        self.site_url.as_str().trim_end_matches('/')
    }
}

/// The result of loading configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading the site configuration.
#[derive(Debug)]
pub enum Error {
    /// Returned when no project file exists in the directory or its parents.
    NotFound(PathBuf),

    /// Returned when the project file can't be opened.
    Open { path: PathBuf, err: io::Error },

    /// Returned when the project file isn't valid.
    DeserializeYaml(serde_yaml::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(dir) => write!(
                f,
                "could not find `{}` in `{}` or any parent directory",
                CONFIG_FILE,
                dir.display()
            ),
            Error::Open { path, err } => {
                write!(f, "opening project file '{}': {}", path.display(), err)
            }
            Error::DeserializeYaml(err) => write!(f, "loading configuration: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::Open { path: _, err } => Some(err),
            Error::DeserializeYaml(err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_directory_searches_parents() -> Result<()> {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "SITE_NAME: My Site\nSITE_URL: https://example.com/\nSITE_DESC: Things\nPER_PAGE: 0\nSEARCH: true\n",
        )
        .unwrap();
        let nested = dir.path().join("travel");
        std::fs::create_dir(&nested).unwrap();

        let config = Config::from_directory(&nested)?;
        assert_eq!(dir.path(), config.site_dir);
        assert_eq!(dir.path().join(".build"), config.build_dir);
        assert_eq!(dir.path().join("themes/default"), config.theme_dir);
        assert_eq!("My Site", config.site_name);
        assert_eq!("https://example.com", config.base_url());
        assert_eq!(0, config.per_page);
        assert!(config.search);
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let project: Project = serde_yaml::from_str("SITE_NAME: x\nSITE_URL: http://x.org\n")?;
        let config = Config::from_project(project, Path::new("/srv/site"));
        assert_eq!(10, config.per_page);
        assert_eq!("default", config.theme);
        assert!(!config.search);
        assert_eq!("", config.site_desc);
        Ok(())
    }

    #[test]
    fn test_invalid_url() {
        let project = serde_yaml::from_str::<Project>("SITE_NAME: x\nSITE_URL: not a url\n");
        assert!(project.is_err());
    }

    #[test]
    fn test_missing_project_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::from_directory(dir.path()),
            Err(Error::NotFound(_))
        ));
    }
}
