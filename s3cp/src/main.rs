use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "s3cp",
    version,
    about = "Copy objects between S3 buckets - server-side, concurrently, under a deadline",
    long_about = "`s3cp` copies objects from one S3 bucket to another using server-side copies. No object \
data passes through the machine running it.

EXAMPLES:
    # Copy a single object under a destination prefix
    s3cp s3://src/file.txt s3://dst/backup/

    # Copy everything under a prefix, 50 copies at a time, waiting for each copy to become visible
    s3cp -r -c 50 --wait s3://src/logs/ s3://dst/archive/

Each successfully copied object is reported on stdout, failures are reported on stderr. Failures of
individual objects do not change the exit status."
)]
struct Args {
    // Copy options
    /// Number of copies in flight at the same time
    #[arg(
        short = 'c',
        long,
        default_value = "10",
        value_name = "NUM",
        help_heading = "Copy options"
    )]
    concurrency: std::num::NonZeroUsize,

    /// Copy every object under the source prefix
    #[arg(short = 'r', long, help_heading = "Copy options")]
    recursive: bool,

    /// Batch timeout in seconds, 0 or less disables it
    ///
    /// When the timeout elapses every copy still in flight is abandoned and reported as failed.
    #[arg(
        short = 't',
        long,
        default_value = "60",
        value_name = "SECONDS",
        allow_negative_numbers = true,
        help_heading = "Copy options"
    )]
    timeout: i64,

    /// Wait until each copied object is visible at the destination before reporting it
    #[arg(short = 'w', long, help_heading = "Copy options")]
    wait: bool,

    /// Delay between visibility checks when using --wait, must be greater than zero
    ///
    /// This option accepts a human readable duration, e.g. "500ms", "5s".
    #[arg(
        long,
        default_value = "5s",
        value_name = "DELAY",
        help_heading = "Copy options"
    )]
    wait_delay: String,

    /// Give up waiting for an object to become visible after this long
    #[arg(
        long,
        default_value = "100s",
        value_name = "DURATION",
        help_heading = "Copy options"
    )]
    wait_max: String,

    // Object attributes
    /// Canned ACL to apply to the copied objects, e.g. "bucket-owner-full-control"
    #[arg(short = 'a', long, value_name = "ACL", help_heading = "Object attributes")]
    acl: Option<String>,

    /// Storage class to apply to the copied objects
    #[arg(
        long,
        default_value = "STANDARD",
        value_name = "CLASS",
        help_heading = "Object attributes"
    )]
    storage_class: String,

    // Session
    /// AWS region
    #[arg(
        long,
        default_value = "us-east-1",
        value_name = "REGION",
        help_heading = "Session"
    )]
    region: String,

    /// Custom endpoint, for S3-compatible services
    #[arg(long, value_name = "URL", help_heading = "Session")]
    endpoint_url: Option<String>,

    /// Use path-style bucket addressing (endpoint/bucket instead of bucket.endpoint)
    #[arg(long, help_heading = "Session")]
    force_path_style: bool,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Toggles the type of progress to show
    ///
    /// If specified, --progress flag is implied.
    ///
    /// Options are: `ProgressBar` (animated status line), `TextUpdates` (appropriate for logging), Auto (default, will
    /// choose between `ProgressBar` or `TextUpdates` depending on the type of terminal attached to stderr)
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Sets the delay between progress updates
    ///
    /// - For the interactive (--progress-type=ProgressBar), the default is 200ms.
    /// - For the non-interactive (--progress-type=TextUpdates), the default is 10s.
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report per-object results or errors (also ignores RUST_LOG)
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Throttle the number of S3 requests per second, 0 means no throttle
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    ops_throttle: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Source address, s3://bucket/key (or s3://bucket/prefix with --recursive)
    #[arg()]
    source: String,

    /// Destination address, s3://bucket/prefix
    #[arg()]
    destination: String,
}

fn parse_duration(option: &str, value: &str) -> Result<std::time::Duration, common::Error> {
    humantime::parse_duration(value)
        .map_err(|err| common::Error::InvalidOption(format!("invalid {option} {value:?}: {err}")))
}

/// Everything that can be checked without talking to S3.
fn validate(
    args: &Args,
) -> Result<(common::Location, common::Location, common::dispatch::Settings), common::Error> {
    let (source, target) = common::parse_locations(&args.source, &args.destination)?;
    if !args.recursive && source.key().is_empty() {
        return Err(common::Error::SourceAddress(
            common::location::Error::Malformed {
                address: args.source.clone(),
                reason: "missing object key, use --recursive to copy a whole bucket".to_string(),
            },
        ));
    }
    let attributes =
        store::ObjectAttributes::new(args.acl.clone(), Some(args.storage_class.clone()))
            .map_err(|err| common::Error::InvalidOption(format!("{err:#}")))?;
    let wait = if args.wait {
        let delay = parse_duration("--wait-delay", &args.wait_delay)?;
        if delay.is_zero() {
            return Err(common::Error::InvalidOption(
                "--wait-delay must be greater than zero".to_string(),
            ));
        }
        Some(store::WaitSettings {
            delay,
            max_wait: parse_duration("--wait-max", &args.wait_max)?,
        })
    } else {
        None
    };
    let settings = common::dispatch::Settings {
        concurrency: args.concurrency,
        recursive: args.recursive,
        copy: common::copy::Settings {
            attributes,
            wait,
            print_records: !args.quiet,
        },
    };
    Ok((source, target, settings))
}

#[instrument(skip(settings))]
async fn async_main(
    args: Args,
    source: common::Location,
    target: common::Location,
    settings: common::dispatch::Settings,
) -> Result<common::copy::Summary, common::Error> {
    let store = common::connect(&store::s3::SessionConfig {
        region: args.region.clone(),
        endpoint_url: args.endpoint_url.clone(),
        force_path_style: args.force_path_style,
    })
    .await?;
    let deadline = common::Deadline::start(common::deadline::timeout_from_secs(args.timeout));
    let summary = common::copy_batch(store, &source, &target, &settings, &deadline).await?;
    tracing::info!(
        "copied {} of {} object(s) from {} to {}",
        summary.objects_copied,
        summary.keys_listed,
        source,
        target
    );
    Ok(summary)
}

fn main() {
    let args = Args::parse();
    let res = validate(&args).and_then(|(source, target, settings)| {
        let func = {
            let args = args.clone();
            || async_main(args, source, target, settings)
        };
        let output = common::OutputConfig {
            quiet: args.quiet,
            verbose: args.verbose,
            print_summary: args.summary,
        };
        let runtime = common::RuntimeConfig {
            max_workers: args.max_workers,
            max_blocking_threads: args.max_blocking_threads,
        };
        let throttle = common::ThrottleConfig {
            ops_throttle: args.ops_throttle,
        };
        common::run(
            if args.progress || args.progress_type.is_some() || args.progress_delay.is_some() {
                Some(common::ProgressSettings {
                    progress_type: args.progress_type.unwrap_or_default(),
                    progress_delay: args.progress_delay.clone(),
                })
            } else {
                None
            },
            output,
            runtime,
            throttle,
            func,
        )
    });
    if let Err(error) = res {
        if !args.quiet {
            eprintln!("s3cp: {error}");
        }
        std::process::exit(error.exit_code());
    }
}
