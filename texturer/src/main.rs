use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use structopt::StructOpt;

use texturer::segment_images::SegmentCommand;
use texturer::texture_images::TextureCommand;

#[derive(StructOpt)]
#[structopt(about = "Partial body texture reconstruction")]
struct Opts {
    #[structopt(help = "Log debug messages", long, short = "v", global = true)]
    verbose: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    Texture(TextureCommand),
    Segment(SegmentCommand),
}

fn main() {
    let opts = Opts::from_args();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let config = Config::default();
    let mode = TerminalMode::Mixed;
    if let Err(err) = TermLogger::init(level, config, mode, ColorChoice::Auto) {
        eprintln!("warning: failed to init logger: {}", err);
    }

    let res = match opts.command {
        Command::Texture(command) => command.run(),
        Command::Segment(command) => command.run(),
    };

    if let Err(err) = res {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
