mod cli;
mod report;

use std::collections::BTreeSet;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, BASH_COMPLETION_CANDIDATES};
use comptest_core::{Session, SessionError};
use log::{debug, error};
use report::{
    describe_mismatch, Report, EXIT_DESYNC, EXIT_MISMATCH, EXIT_OK, EXIT_STARTUP,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = match cli.session_config(BASH_COMPLETION_CANDIDATES) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_STARTUP as u8);
        }
    };
    debug!("{config:?}");

    let mut session = match Session::start(config).await {
        Ok(session) => session,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_STARTUP as u8);
        }
    };

    let code = match run(&cli, &mut session).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            EXIT_DESYNC
        }
    };
    session.close();
    ExitCode::from(code as u8)
}

async fn run(cli: &Cli, session: &mut Session) -> Result<i32, SessionError> {
    if let Some(expected) = &cli.expect_single {
        let matched = session
            .query_single_candidate(&cli.cmd, expected, cli.timeout)
            .await?;
        let report = Report::single_check(&cli.cmd, expected, matched);
        emit(cli, &report);
        if !matched {
            eprintln!("{:?} did not complete to {expected:?}", cli.cmd);
            return Ok(EXIT_MISMATCH);
        }
        return Ok(EXIT_OK);
    }

    let result = session.query_completions(&cli.cmd, cli.timeout).await?;
    let mut report = Report::new(&cli.cmd, &result);

    let mut code = EXIT_OK;
    if let Some(expected) = &cli.expect {
        let expected: BTreeSet<String> = expected.iter().cloned().collect();
        let actual = result.candidates();
        let matched = expected == actual;
        report = report.with_verdict(matched);
        if !matched {
            eprintln!(
                "completions for {:?} differ: {}",
                cli.cmd,
                describe_mismatch(&expected, &actual)
            );
            code = EXIT_MISMATCH;
        }
    } else if result.is_none() {
        eprintln!("no completions for {:?}", cli.cmd);
    }

    emit(cli, &report);
    Ok(code)
}

fn emit(cli: &Cli, report: &Report) {
    if cli.json {
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => error!("could not encode report: {e}"),
        }
    } else {
        print!("{}", report.to_text());
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} - {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
