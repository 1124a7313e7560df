//! # CLI Layer
//!
//! The only place in the workspace that:
//! - Knows about terminal I/O (stdout, stderr)
//! - Installs the log subscriber
//! - Formats output for human consumption
//!
//! ## Responsibilities
//!
//! 1. **Context Setup**: resolve configuration and the notebook via [`initialize`]
//! 2. **Dispatch**: route each command to its handler
//! 3. **Output Formatting**: hand results to `render`

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use notebookapp::connection::http::NotebookServer;
use notebookapp::connection::{open_connection, HttpConnection, NotebookConnection};
use notebookapp::init::{create_notebook, initialize, NotebookContext};
use notebookapp::sync::sync_tree;
use notebookapp::{Notebook, CONTENT_TYPE_DIR, CONTENT_TYPE_PAGE};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::render::{self, TreeEntry};
use super::setup::{parse_cli, Commands};

pub const LOG_ENV: &str = "NOTEBOOK_LOG";

pub fn run() -> Result<()> {
    let cli = parse_cli();
    init_logging(cli.verbose);

    let ctx = initialize(cli.notebook.as_deref());
    debug!(command = ?cli.command, "dispatching");

    match cli.command {
        Commands::Init { path, title } => handle_init(&ctx, &path, title),
        Commands::Sync { src, dst } => handle_sync(&src, &dst),
        Commands::StartHttpServer { port, notebook } => handle_start_server(&ctx, port, &notebook),
        Commands::StopHttpServer { port } => handle_stop_server(&ctx, port),
        command => {
            let mut notebook = ctx
                .open()
                .with_context(|| format!("cannot open notebook {}", ctx.notebook.as_deref().unwrap_or("")))?;
            let result = dispatch(&mut notebook, command);
            notebook.close()?;
            result
        }
    }
}

/// `NOTEBOOK_LOG` wins; otherwise `warn`, or `debug` with `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn dispatch(nb: &mut Notebook, command: Commands) -> Result<()> {
    match command {
        Commands::Tree { json } => handle_tree(nb, json),
        Commands::Show { nodeid, json } => handle_show(nb, &nodeid, json),
        Commands::New {
            parent,
            title,
            page,
        } => {
            let parent = resolve(nb, &parent)?;
            let content_type = if page { CONTENT_TYPE_PAGE } else { CONTENT_TYPE_DIR };
            let nodeid = nb.new_child(&parent, content_type, &title.join(" "), None)?;
            println!("{}", nodeid);
            Ok(())
        }
        Commands::Rename { nodeid, title } => {
            let nodeid = resolve(nb, &nodeid)?;
            nb.rename(&nodeid, &title.join(" "))?;
            print!("{}", render::success("Renamed."));
            Ok(())
        }
        Commands::Move {
            nodeid,
            parent,
            index,
        } => {
            let nodeid = resolve(nb, &nodeid)?;
            let parent = resolve(nb, &parent)?;
            nb.move_node(&nodeid, &parent, index)?;
            print!("{}", render::success("Moved."));
            Ok(())
        }
        Commands::Trash { nodeid } => {
            let nodeid = resolve(nb, &nodeid)?;
            let was_in_trash = nb.in_trash(&nodeid)?;
            nb.trash(&nodeid)?;
            let message = if was_in_trash { "Deleted." } else { "Moved to trash." };
            print!("{}", render::success(message));
            Ok(())
        }
        Commands::EmptyTrash => {
            nb.empty_trash()?;
            print!("{}", render::success("Trash emptied."));
            Ok(())
        }
        Commands::Search { text } => {
            let matches = nb.search_titles(&text.join(" "))?;
            print!("{}", render::render_matches(&matches));
            Ok(())
        }
        Commands::Fulltext { text } => {
            let mut matches = Vec::new();
            for nodeid in nb.search_fulltext(&text.join(" "))? {
                let title = nb.get_node(&nodeid)?.title().to_string();
                matches.push((nodeid, title));
            }
            print!("{}", render::render_matches(&matches));
            Ok(())
        }
        Commands::Reindex => {
            let count = nb.reindex(None)?;
            print!("{}", render::success(&format!("Indexed {} nodes.", count)));
            Ok(())
        }
        Commands::Init { .. }
        | Commands::Sync { .. }
        | Commands::StartHttpServer { .. }
        | Commands::StopHttpServer { .. } => Err(anyhow!("command does not act on an open notebook")),
    }
}

/// Maps the `root` and `trash` shorthands to node ids.
fn resolve(nb: &Notebook, nodeid: &str) -> Result<String> {
    match nodeid {
        "root" => Ok(nb.rootid().to_string()),
        "trash" => nb
            .trashid()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("notebook has no trash")),
        other => Ok(other.to_string()),
    }
}

fn handle_init(ctx: &NotebookContext, path: &str, title: Option<String>) -> Result<()> {
    let title = title.unwrap_or_else(|| {
        Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Notebook".to_string())
    });
    let notebook = create_notebook(path, &title, &ctx.config)
        .with_context(|| format!("cannot create notebook at {}", path))?;
    let rootid = notebook.rootid().to_string();
    notebook.close()?;
    print!("{}", render::success(&format!("Created notebook '{}' ({}).", title, rootid)));
    Ok(())
}

fn handle_tree(nb: &mut Notebook, json: bool) -> Result<()> {
    let root = nb.root()?;
    let mut entries = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        entries.push(TreeEntry::new(&node, depth));
        let children = nb.children(node.nodeid())?;
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", render::render_tree(&entries));
    }
    Ok(())
}

fn handle_show(nb: &mut Notebook, nodeid: &str, json: bool) -> Result<()> {
    let nodeid = resolve(nb, nodeid)?;
    let node = nb.get_node(&nodeid)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&node.attr().to_json())?);
        return Ok(());
    }
    let files = nb.list_files(&nodeid, "")?;
    let now = chrono::Utc::now().timestamp();
    print!("{}", render::render_node(&node, &files, now));
    Ok(())
}

fn handle_sync(src: &str, dst: &str) -> Result<()> {
    let mut source = open_connection(src).with_context(|| format!("cannot open {}", src))?;
    let mut dest = open_connection(dst).with_context(|| format!("cannot open {}", dst))?;
    let rootid = source.get_rootid()?;

    let stats = sync_tree(&rootid, source.as_mut(), dest.as_mut(), None)?;
    dest.close()?;
    source.close()?;
    print!("{}", render::render_sync(&stats));
    Ok(())
}

fn handle_start_server(ctx: &NotebookContext, port: u16, notebook: &str) -> Result<()> {
    let conn = open_connection(notebook).with_context(|| format!("cannot open {}", notebook))?;
    let server = NotebookServer::start(conn, &ctx.config.server_host, port)?;
    print!("{}", render::success(&format!("Serving {} at {}", notebook, server.url())));
    server.wait()?;
    Ok(())
}

fn handle_stop_server(ctx: &NotebookContext, port: u16) -> Result<()> {
    let mut client = HttpConnection::new();
    client.connect(&ctx.config.server_url(Some(port)))?;
    client
        .shutdown_server()
        .with_context(|| format!("no server answered on port {}", port))?;
    print!("{}", render::success("Server stopped."));
    Ok(())
}
