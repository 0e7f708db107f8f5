//! Command Line Interface (CLI) arguments.

use std::num::NonZeroUsize;

use clap::Parser;

/// pypeit-lev2 command line interface
#[derive(Clone, Debug, Parser)]
#[command(version, about)]
pub struct CommandLineArgs {
    /// Instrument choice. To see available instruments, use --instrument-options
    #[arg(required_unless_present = "instrument_options")]
    pub instrument: Option<String>,
    /// Path to raw files. Defaults to the current directory
    #[arg(short = 'i', long = "input-dir", env = "PYPEIT_LEV2_INPUT_DIR")]
    pub input_dir: Option<String>,
    /// Directory to put output in. Defaults to ./redux
    #[arg(short = 'o', long = "output-dir", env = "PYPEIT_LEV2_OUTPUT_DIR")]
    pub output_dir: Option<String>,
    /// Base root of the raw files, e.g. "DE.", "KB.". If not given, the root is taken from the
    /// instrument table in the config file
    #[arg(short = 'r', long, env = "PYPEIT_LEV2_ROOT")]
    pub root: Option<String>,
    /// Number of reductions to run concurrently. Defaults to the number of CPUs minus one
    #[arg(short = 'n', long = "num-proc", env = "PYPEIT_LEV2_NUM_PROC")]
    pub num_proc: Option<NonZeroUsize>,
    /// Config file to use
    #[arg(
        short = 'c',
        long = "config",
        default_value = "./pypeit_lev2.ini",
        env = "PYPEIT_LEV2_CONFIG"
    )]
    pub config_file: String,
    /// Only create the setup files, don't reduce them
    #[arg(long, default_value_t = false, env = "PYPEIT_LEV2_SETUP_ONLY")]
    pub setup_only: bool,
    /// Print the instruments this tool can reduce and exit
    #[arg(long, default_value_t = false, env = "PYPEIT_LEV2_INSTRUMENT_OPTIONS")]
    pub instrument_options: bool,
    /// Command used to reduce each setup file
    #[arg(
        long,
        default_value = "run_pypeit",
        env = "PYPEIT_LEV2_REDUCE_COMMAND"
    )]
    pub reduce_command: String,
    /// Command used to generate the setup files from the raw data
    #[arg(
        long,
        default_value = "pypeit_setup",
        env = "PYPEIT_LEV2_SETUP_COMMAND"
    )]
    pub setup_command: String,
    /// Skip setup generation and reduce the setup files already present
    #[arg(long, default_value_t = false, env = "PYPEIT_LEV2_SKIP_SETUP")]
    pub skip_setup: bool,
    /// Name of the setup files directory under the input directory
    #[arg(long, default_value = "setup_files", env = "PYPEIT_LEV2_SETUP_DIR")]
    pub setup_dir: String,
    /// File extension of the setup files
    #[arg(long, default_value = "pypeit", env = "PYPEIT_LEV2_EXTENSION")]
    pub extension: String,
    /// Kill a reduction that runs for longer than this many seconds. By default reductions run
    /// to completion
    #[arg(long, env = "PYPEIT_LEV2_JOB_TIMEOUT")]
    pub job_timeout: Option<u64>,
    /// Don't alert RTI when a reduction completes
    #[arg(long, default_value_t = false, env = "PYPEIT_LEV2_NO_NOTIFY")]
    pub no_notify: bool,
    /// Exit with a non-zero status if any reduction failed
    #[arg(long, default_value_t = false, env = "PYPEIT_LEV2_STRICT")]
    pub strict: bool,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
