use std::error::Error;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{error, info, LevelFilter};
use portico::build::Builder;
use portico::config::{Config, DEFAULT_THEME};
use portico::scaffold::{self, SiteOptions};
use portico::template::Theme;
use portico::watch::watch;
use simple_logger::SimpleLogger;
use url::Url;

type BoxResult<T> = Result<T, Box<dyn Error>>;

fn app<'a, 'b>() -> App<'a, 'b> {
    let dir = || {
        Arg::with_name("dir")
            .required(true)
            .help("The site directory")
    };
    App::new("portico")
        .version(crate_version!())
        .about("Builds static sites from category-organized Markdown")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .global(true)
                .help("Logs every file written"),
        )
        .subcommand(
            SubCommand::with_name("create")
                .about("Creates a new site")
                .arg(dir())
                .arg(Arg::with_name("name").long("name").takes_value(true))
                .arg(Arg::with_name("url").long("url").takes_value(true))
                .arg(Arg::with_name("desc").long("desc").takes_value(true))
                .arg(Arg::with_name("per-page").long("per-page").takes_value(true))
                .arg(Arg::with_name("theme").long("theme").takes_value(true)),
        )
        .subcommand(
            SubCommand::with_name("build")
                .about("Builds the site")
                .arg(dir()),
        )
        .subcommand(
            SubCommand::with_name("watch")
                .about("Builds the site and rebuilds it on changes")
                .arg(dir()),
        )
        .subcommand(
            SubCommand::with_name("post")
                .about("Creates a new post")
                .arg(dir())
                .arg(Arg::with_name("category").required(true))
                .arg(Arg::with_name("title").required(true))
                .arg(Arg::with_name("draft").long("draft")),
        )
        .subcommand(
            SubCommand::with_name("category")
                .about("Creates a new category")
                .arg(dir())
                .arg(Arg::with_name("name").required(true)),
        )
}

fn main() {
    let matches = app().get_matches();
    let verbose = matches.is_present("verbose")
        || matches
            .subcommand()
            .1
            .map_or(false, |sub| sub.is_present("verbose"));
    let level = match verbose {
        true => LevelFilter::Debug,
        false => LevelFilter::Info,
    };
    if let Err(err) = SimpleLogger::new().with_level(level).init() {
        eprintln!("initializing logger: {}", err);
    }

    match run(&matches) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
}

/// Runs the selected subcommand. Returns `false` when a build finished but
/// some sources failed to compile.
fn run(matches: &ArgMatches) -> BoxResult<bool> {
    match matches.subcommand() {
        ("create", Some(args)) => create(args),
        ("build", Some(args)) => {
            let config = load_config(args)?;
            let theme = Theme::load(&config.theme_dir)?;
            let (_, report) = Builder::new(&config, &theme).build()?;
            if !report.is_clean() {
                error!("{} sources failed to compile", report.failures.len());
            }
            Ok(report.is_clean())
        }
        ("watch", Some(args)) => {
            let config = load_config(args)?;
            let theme = Theme::load(&config.theme_dir)?;
            watch(&Builder::new(&config, &theme))?;
            Ok(true)
        }
        ("post", Some(args)) => {
            let config = load_config(args)?;
            scaffold::new_post(
                &config.site_dir,
                args.value_of("category").unwrap_or_default(),
                args.value_of("title").unwrap_or_default(),
                args.is_present("draft"),
                Utc::now(),
            )?;
            Ok(true)
        }
        ("category", Some(args)) => {
            let config = load_config(args)?;
            scaffold::new_category(&config.site_dir, args.value_of("name").unwrap_or_default())?;
            Ok(true)
        }
        _ => Ok(true),
    }
}

fn site_dir(args: &ArgMatches) -> PathBuf {
    PathBuf::from(args.value_of("dir").unwrap_or("."))
}

/// Loads the configuration for the `dir` argument. The directory is made
/// absolute so paths reported by the file watcher line up with it.
fn load_config(args: &ArgMatches) -> BoxResult<Config> {
    let dir = std::fs::canonicalize(site_dir(args))?;
    Ok(Config::from_directory(&dir)?)
}

fn create(args: &ArgMatches) -> BoxResult<bool> {
    let dir = site_dir(args);
    std::fs::create_dir_all(&dir)?;
    let dir = std::fs::canonicalize(dir)?;
    let options = SiteOptions {
        name: match args.value_of("name") {
            Some(name) => name.to_owned(),
            None => default_name(&dir),
        },
        url: Url::parse(args.value_of("url").unwrap_or("http://localhost/"))?,
        desc: args.value_of("desc").unwrap_or_default().to_owned(),
        per_page: match args.value_of("per-page") {
            Some(n) => n.parse()?,
            None => 10,
        },
        theme: args.value_of("theme").unwrap_or(DEFAULT_THEME).to_owned(),
    };
    let config_path = scaffold::create_site(&dir, &options)?;
    info!("edit {} to change the site settings", config_path.display());
    Ok(true)
}

fn default_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "My Site".to_owned())
}
