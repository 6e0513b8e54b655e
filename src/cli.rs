use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start scribble as an HTTP service.
    Daemon {
        /// Address to listen on
        #[clap(long, default_value = "0.0.0.0:8080")]
        addr: String,

        /// Skip the startup model load and refresh pass
        #[clap(long, default_value = "false")]
        no_preload: bool,
    },

    /// Search cached posts by meaning
    Search {
        query: String,

        /// Number of results to return
        #[clap(short = 'n', long)]
        top_n: Option<usize>,

        /// Drop results scoring below this similarity [-1.0, 1.0]
        #[clap(short, long, allow_hyphen_values = true)]
        min_similarity: Option<f32>,
    },

    /// List cached posts
    List {
        /// Limit to one configured platform
        #[clap(short, long)]
        platform: Option<String>,
    },

    /// Print one post in full
    Show {
        /// Post id as printed by list/search
        id: String,
    },

    /// Fetch new posts and update embeddings
    Refresh {
        /// Limit to one configured platform
        #[clap(short, long)]
        platform: Option<String>,

        /// Fetch even when the snapshot is within its TTL
        #[clap(short, long, default_value = "false")]
        force: bool,
    },

    /// Show configured platforms and snapshot status
    Platforms {},
}
