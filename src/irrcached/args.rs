//! Manage command line arguments here.
use clap::{App, Arg};

use irrlib::error::IRRResult;

/// This structure holds the command line arguments.
#[derive(Debug, Default)]
pub struct CliOptions {
    pub config: String,
    pub cache_dir: Option<String>,
    pub listen: Option<String>,
}

impl CliOptions {
    pub fn options() -> IRRResult<Self> {
        let matches = App::new("tiny IRR database cache")
            .version("0.1")
            .about(
                r#"Mirrors routing policy data from IRR databases and answers
as-set/ASN prefix expansion queries over HTTP.
"#,
            )
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .required(true)
                    .long_help("Path to the JSON registry configuration")
                    .takes_value(true),
            )
            .arg(
                Arg::new("cache-dir")
                    .short('d')
                    .long("cache-dir")
                    .required(false)
                    .long_help("Directory holding the snapshot files, overrides the config")
                    .takes_value(true),
            )
            .arg(
                Arg::new("listen")
                    .short('l')
                    .long("listen")
                    .required(false)
                    .long_help("Listen address for the query interface, overrides the config")
                    .takes_value(true),
            )
            .get_matches();

        // save all cli options into a structure
        let mut options = CliOptions::default();

        options.config = String::from(matches.value_of("config").unwrap());
        options.cache_dir = matches.value_of("cache-dir").map(String::from);
        options.listen = matches.value_of("listen").map(String::from);

        Ok(options)
    }
}
