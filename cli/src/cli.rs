use clap::Parser;
use clap::ValueEnum;
use quorum_core::ConsensusMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Debate a question across a panel of agent CLIs")]
pub struct Cli {
    /// Config file with the agent roster and debate settings.
    #[arg(long, short = 'c', value_name = "FILE", default_value = "quorum.toml")]
    pub config: PathBuf,

    /// Override the configured maximum number of rounds.
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Override the configured consensus mode.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Question for the panel. Pass `-` (or pipe) to read it from stdin.
    pub question: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ModeArg {
    Unanimous,
    Super,
    Majority,
}

impl From<ModeArg> for ConsensusMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Unanimous => ConsensusMode::Unanimous,
            ModeArg::Super => ConsensusMode::Super,
            ModeArg::Majority => ConsensusMode::Majority,
        }
    }
}
