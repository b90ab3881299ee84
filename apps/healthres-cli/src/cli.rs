use clap::{Parser, Subcommand};

use healthres_core::types::BackendKind;

#[derive(Parser, Debug)]
#[command(name = "healthres")]
#[command(about = "Search and ask questions over a corpus of health research abstracts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Load, embed and index the corpus, reporting each phase")]
    Ingest,

    #[command(about = "Show the nearest abstracts for a query")]
    Search {
        #[arg(help = "Research question or keywords")]
        query: String,

        #[arg(short, long, default_value = "local", help = "local (in-process index) or remote (vector store)")]
        backend: BackendKind,

        #[arg(short = 'k', long, help = "Number of results (defaults to retrieval.top_k)")]
        top_k: Option<usize>,
    },

    #[command(about = "Answer a question from the retrieved abstracts")]
    Ask {
        #[arg(help = "Research question")]
        query: String,

        #[arg(short, long, default_value = "local", help = "local (in-process index) or remote (vector store)")]
        backend: BackendKind,

        #[arg(short = 'k', long, help = "Number of results (defaults to retrieval.top_k)")]
        top_k: Option<usize>,

        #[arg(long, help = "Print the answer as it is generated")]
        stream: bool,
    },

    #[command(about = "Start an interactive chat session")]
    Chat {
        #[arg(short, long, default_value = "local", help = "Initial backend; switch with /backend")]
        backend: BackendKind,

        #[arg(short = 'k', long, help = "Number of results (defaults to retrieval.top_k)")]
        top_k: Option<usize>,

        #[arg(long, help = "Print answers as they are generated")]
        stream: bool,
    },
}
