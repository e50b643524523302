use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The class file to load
    pub path: PathBuf,

    #[arg(short, long)]
    /// Print the contents of the class file
    pub contents: bool,

    #[arg(short, long)]
    /// Run the class's static main method
    pub execute: bool,

    #[arg(short, long)]
    /// Start output with a UTF-8 byte order mark
    pub bom: bool,

    #[arg(long("cp"))]
    /// Extra directories to search for classes
    pub classpath: Vec<PathBuf>,

    #[arg(long, default_value_t = 256)]
    /// How deep calls may nest before execution fails
    pub max_stack: usize,

    #[arg(short, long, action = clap::ArgAction::Count)]
    /// Log more (-v for debug, -vv for trace)
    pub verbose: u8,
}
