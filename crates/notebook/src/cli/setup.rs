use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "notebook",
    bin_name = "notebook",
    version,
    disable_help_subcommand = true
)]
#[command(about = "Work with hierarchical notebooks from the command line", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Notebook path or URL (defaults to `default_notebook` from the config)
    #[arg(short, long, global = true, help_heading = "Options")]
    pub notebook: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Create a new notebook
    #[command(display_order = 1)]
    Init {
        /// Directory for the notebook
        path: String,

        /// Title of the root node (defaults to the directory name)
        #[arg(long)]
        title: Option<String>,
    },

    /// Print the node tree
    #[command(alias = "ls", display_order = 2)]
    Tree {
        /// Print JSON instead of an indented tree
        #[arg(long)]
        json: bool,
    },

    /// Show one node's attributes and files
    #[command(display_order = 3)]
    Show {
        nodeid: String,

        /// Print the raw attributes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a folder, or a page with --page
    #[command(alias = "n", display_order = 10)]
    New {
        /// Parent node id
        parent: String,

        /// Title words (joined with spaces)
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        #[arg(long)]
        page: bool,
    },

    /// Change a node's title
    #[command(display_order = 11)]
    Rename {
        nodeid: String,

        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },

    /// Move a node under another parent
    #[command(alias = "mv", display_order = 12)]
    Move {
        nodeid: String,

        /// New parent node id
        parent: String,

        /// Position among the new siblings (appends if omitted)
        #[arg(long)]
        index: Option<usize>,
    },

    /// Move a node to the trash, or delete it if it already is there
    #[command(alias = "rm", display_order = 13)]
    Trash { nodeid: String },

    /// Permanently delete everything in the trash
    #[command(display_order = 14)]
    EmptyTrash,

    /// Search node titles
    #[command(display_order = 20)]
    Search {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Search page text
    #[command(display_order = 21)]
    Fulltext {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Rebuild the index from the notebook directory
    #[command(display_order = 22)]
    Reindex,

    /// Copy newer nodes from one notebook to another
    #[command(display_order = 30)]
    Sync {
        /// Source notebook path or URL
        src: String,

        /// Destination notebook path or URL
        dst: String,
    },

    /// Serve a notebook over HTTP until stopped
    #[command(display_order = 31)]
    StartHttpServer {
        port: u16,

        /// Notebook path to serve
        notebook: String,
    },

    /// Stop a server started with start-http-server
    #[command(display_order = 32)]
    StopHttpServer { port: u16 },
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("notebook").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = parse(&["tree", "--notebook", "/tmp/nb", "-v"]);
        assert_eq!(cli.notebook.as_deref(), Some("/tmp/nb"));
        assert!(cli.verbose);
        assert_eq!(cli.command, Commands::Tree { json: false });
    }

    #[test]
    fn test_new_joins_title_words() {
        let cli = parse(&["new", "root", "Meeting", "notes", "--page"]);
        assert_eq!(
            cli.command,
            Commands::New {
                parent: "root".into(),
                title: vec!["Meeting".into(), "notes".into()],
                page: true,
            }
        );
    }

    #[test]
    fn test_move_with_index() {
        let cli = parse(&["mv", "a", "b", "--index", "2"]);
        assert_eq!(
            cli.command,
            Commands::Move {
                nodeid: "a".into(),
                parent: "b".into(),
                index: Some(2),
            }
        );
    }

    #[test]
    fn test_server_commands() {
        let cli = parse(&["start-http-server", "8001", "/tmp/nb"]);
        assert_eq!(
            cli.command,
            Commands::StartHttpServer {
                port: 8001,
                notebook: "/tmp/nb".into(),
            }
        );
        let cli = parse(&["stop-http-server", "8001"]);
        assert_eq!(cli.command, Commands::StopHttpServer { port: 8001 });
    }

    #[test]
    fn test_rejects_bad_input() {
        let args = |a: &[&'static str]| Cli::try_parse_from(std::iter::once("notebook").chain(a.iter().copied()));
        assert!(args(&[]).is_err());
        assert!(args(&["search"]).is_err());
        assert!(args(&["stop-http-server", "not-a-port"]).is_err());
    }
}
