use hostlcd::{app::App, cli::Command, Result};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match Command::parse(&args) {
        Ok(Command::ShowHelp) => {
            Command::print_help();
            Ok(())
        }
        Ok(Command::ShowVersion) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Ok(Command::Run(opts)) => App::from_options(opts)?.run(),
        Ok(Command::TestPattern(opts)) => App::from_options(opts)?.show_test_pattern(),
        Ok(Command::Report(opts)) => App::from_options(opts)?.print_report(),
        Err(err) => {
            Command::print_help();
            Err(err)
        }
    }
}
