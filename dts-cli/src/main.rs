use clap::Parser as ClapParser;
use dts::ParseOptions;
use std::path::PathBuf;
use std::process::exit;

/// Parses a devicetree source file and prints its canonical re-serialization
/// to stdout, or reports a parse error on stderr and exits non-zero.
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root DTS file to parse, or '-' for standard input.
    file: String,
    #[arg(short, long, help = "Add a directory to search for /include/d files")]
    include: Option<Vec<String>>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut options = ParseOptions::new();
    for path in args.include.unwrap_or_default() {
        options.add_include_path(PathBuf::from(path));
    }

    match dts::parse_file(&args.file, &options) {
        Ok(tree) => {
            print!("{tree}");
        }
        Err(err) => {
            eprintln!("{err}");
            exit(1);
        }
    }
}
