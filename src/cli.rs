//! CLI module
//!
//! This module provides the command-line interface of the mikado tool. Every
//! goal command is sent to a running server; `serve` starts one.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::path::PathBuf;

use crate::{
    api::{serve, Client, ClientConfig, ServerConfig},
    domain::{Command, EdgeType, GoalId, RenderResult, RenderRow, UNSPECIFIED},
    guide,
    session::{GoalsResponse, DEFAULT_ROOT_NAME},
    snapshot::Snapshot,
    stats::Stats,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(short, long, env = "MIKADO_SERVER", default_value = "http://localhost:3000")]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the mikado API server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "MIKADO_PORT", default_value_t = 3000)]
        port: u16,

        /// Directory of the goal store; goals live in memory only when omitted
        #[arg(long, env = "MIKADO_DB")]
        db: Option<PathBuf>,

        /// Name of the root goal of a new store
        #[arg(long, default_value = DEFAULT_ROOT_NAME)]
        root_name: String,
    },

    /// Add a new goal
    Add {
        /// Goal name
        name: String,

        /// Goal to attach the new one to (defaults to the selection)
        #[arg(short = 'u', long, default_value_t = UNSPECIFIED)]
        parent: GoalId,

        /// Kind of the edge from the parent: parent, blocker or relation
        #[arg(short, long, default_value_t = EdgeType::Parent)]
        edge: EdgeType,
    },

    /// Insert a new goal between two linked goals
    Insert {
        /// Goal name
        name: String,

        /// Lower goal (defaults to the previous selection)
        #[arg(short, long, default_value_t = UNSPECIFIED)]
        lower: GoalId,

        /// Upper goal (defaults to the selection)
        #[arg(short = 'u', long, default_value_t = UNSPECIFIED)]
        upper: GoalId,
    },

    /// Rename a goal
    Rename {
        /// New name
        name: String,

        /// Goal to rename (defaults to the selection)
        #[arg(short, long, default_value_t = UNSPECIFIED)]
        goal: GoalId,
    },

    /// Close an open goal or reopen a closed one
    Close {
        /// Goal to toggle (defaults to the selection)
        #[arg(default_value_t = UNSPECIFIED)]
        goal: GoalId,
    },

    /// Delete a goal together with its subgoals
    Delete {
        /// Goal to delete (defaults to the selection)
        #[arg(default_value_t = UNSPECIFIED)]
        goal: GoalId,
    },

    /// Create or remove an edge between two goals
    Link {
        /// Lower goal (defaults to the previous selection)
        #[arg(short, long, default_value_t = UNSPECIFIED)]
        lower: GoalId,

        /// Upper goal (defaults to the selection)
        #[arg(short = 'u', long, default_value_t = UNSPECIFIED)]
        upper: GoalId,

        /// Kind of the edge: blocker, parent or relation
        #[arg(short, long, default_value_t = EdgeType::Blocker)]
        edge: EdgeType,
    },

    /// Select a goal
    Select {
        /// Goal number
        goal: GoalId,
    },

    /// Remember the selection as the previous selection
    Hold,

    /// Zoom into a goal, or zoom out of it
    Zoom {
        /// Goal to zoom (defaults to the selection)
        #[arg(default_value_t = UNSPECIFIED)]
        goal: GoalId,
    },

    /// Set or clear the autolink keyword of a goal
    Autolink {
        /// Keyword; an empty keyword removes the autolink
        keyword: String,

        /// Goal that owns the keyword (defaults to the selection)
        #[arg(short, long, default_value_t = UNSPECIFIED)]
        goal: GoalId,
    },

    /// Show only goals whose names contain the pattern
    Filter {
        /// Pattern; omit it to clear the filter
        #[arg(default_value = "")]
        pattern: String,
    },

    /// Toggle hiding of closed goals
    #[command(name = "open-view")]
    OpenView,

    /// Toggle progress annotations
    Progress,

    /// Toggle showing only switchable goals
    Switchable,

    /// Show the goal tree
    Show,

    /// Show goal graph statistics
    Stats,

    /// Export the goals as a JSON snapshot
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the goals with a JSON snapshot
    Import {
        /// Snapshot file
        file: PathBuf,
    },

    /// Guide on how to use this tool
    Guide,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    // Maps a goal subcommand onto the command it sends to the server
    fn to_goal_command(&self) -> Option<Command> {
        let command = match self {
            Commands::Add { name, parent, edge } => Command::add_with(name, *parent, *edge),
            Commands::Insert { name, lower, upper } => Command::insert(name, *lower, *upper),
            Commands::Rename { name, goal } => Command::rename(name, *goal),
            Commands::Close { goal } => Command::toggle_close(*goal),
            Commands::Delete { goal } => Command::delete(*goal),
            Commands::Link { lower, upper, edge } => Command::toggle_link(*lower, *upper, *edge),
            Commands::Select { goal } => Command::select(*goal),
            Commands::Hold => Command::HoldSelect,
            Commands::Zoom { goal } => Command::toggle_zoom(*goal),
            Commands::Autolink { keyword, goal } => Command::toggle_autolink(keyword, *goal),
            Commands::Filter { pattern } => Command::filter_by(pattern),
            Commands::OpenView => Command::ToggleOpenView,
            Commands::Progress => Command::ToggleProgress,
            Commands::Switchable => Command::ToggleSwitchableView,
            _ => return None,
        };
        Some(command)
    }
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(command) = cli.command.to_goal_command() {
        let client = create_client(&cli.server);
        let response = client.apply(vec![command]).await?;
        print_response(&response);
        return Ok(());
    }

    match &cli.command {
        Commands::Serve {
            port,
            db,
            root_name,
        } => {
            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
                store_path: db.clone(),
                root_name: root_name.clone(),
            };
            match db {
                Some(path) => println!(
                    "Starting mikado API server on port {} with goals in {}...",
                    port,
                    path.display()
                ),
                None => println!("Starting mikado API server on port {} (in memory)...", port),
            }

            let core = config.open_core()?;
            serve(core, config).await?;
            Ok(())
        }

        Commands::Show => {
            let client = create_client(&cli.server);
            let result = client.render().await?;
            print_render_result(&result);
            Ok(())
        }

        Commands::Stats => {
            let client = create_client(&cli.server);
            let stats = client.stats().await?;
            print_stats(&stats);
            Ok(())
        }

        Commands::Export { output } => {
            let client = create_client(&cli.server);
            let snapshot = client.export().await?;
            let json = serde_json::to_string_pretty(&snapshot)?;
            match output {
                Some(path) => {
                    std::fs::write(path, json)?;
                    println!("Exported {} goals to {}", snapshot.goals.len(), path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }

        Commands::Import { file } => {
            let client = create_client(&cli.server);
            let snapshot: Snapshot = serde_json::from_slice(&std::fs::read(file)?)?;
            let result = client.import(&snapshot).await?;
            println!("Imported goals from {}", file.display());
            print_render_result(&result);
            Ok(())
        }

        Commands::Guide => {
            println!("{}", guide::get_guide_string());

            // Only display the goals if a server is running
            let client = create_client(&cli.server);
            if let Ok(result) = client.render().await {
                println!("\n=== CURRENT GOALS ===\n");
                print_render_result(&result);
            }

            Ok(())
        }

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }

        _ => Ok(()),
    }
}

fn create_client(server_url: &str) -> Client {
    let config = ClientConfig {
        base_url: server_url.to_string(),
    };

    Client::with_config(config)
}

fn print_response(response: &GoalsResponse<RenderResult>) {
    print_render_result(response.inner());

    for message in &response.messages {
        println!("{} {}", "!".yellow().bold(), message.yellow());
    }
}

fn print_render_result(result: &RenderResult) {
    let selection = result.selection();
    let previous = result.previous_selection();

    for line in format_rows(result) {
        let row = line.row;
        let marker = if Some(row.goal_id) == selection {
            "*"
        } else if Some(row.goal_id) == previous {
            "+"
        } else {
            " "
        };
        let status = if row.is_open { "[ ]" } else { "[x]" };
        let name = if !row.is_open {
            row.name.dimmed()
        } else if row.is_switchable {
            row.name.green()
        } else {
            row.name.normal()
        };

        let mut text = format!(
            "{}{} {:>3} {} {}",
            "  ".repeat(line.depth),
            marker.cyan().bold(),
            row.goal_id,
            status,
            name
        );
        let links = format_links(row);
        if !links.is_empty() {
            text.push_str(&format!(" {}", links.blue()));
        }
        for (key, value) in &row.attrs {
            text.push_str(&format!(" {}", format!("[{}: {}]", key, value).magenta()));
        }
        println!("{}", text);
    }

    for (key, value) in &result.global_opts {
        if key == "selection" || key == "previous_selection" {
            continue;
        }
        println!("{}", format!("{}: {}", key, value).dimmed());
    }
}

fn print_stats(stats: &Stats) {
    println!("Goals:  {}", stats.goals);
    println!("Closed: {}", stats.closed);
    println!("Edges:  {}", stats.edges);
    println!("Paths:  {}", stats.paths);
}

struct TreeLine<'a> {
    depth: usize,
    row: &'a RenderRow,
}

/// Orders rows depth-first along PARENT edges starting from the roots. Rows
/// that aren't reachable that way are appended at depth zero.
fn format_rows(result: &RenderResult) -> Vec<TreeLine<'_>> {
    let mut lines = Vec::with_capacity(result.rows.len());
    let mut seen = std::collections::BTreeSet::new();
    let mut stack: Vec<(GoalId, usize)> = result.roots.iter().rev().map(|id| (*id, 0)).collect();

    while let Some((goal_id, depth)) = stack.pop() {
        let Some(row) = result.by_id(goal_id) else {
            continue;
        };
        if !seen.insert(goal_id) {
            continue;
        }
        lines.push(TreeLine { depth, row });
        let mut children: Vec<GoalId> = row.children().collect();
        children.sort_unstable();
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }

    for row in &result.rows {
        if seen.insert(row.goal_id) {
            lines.push(TreeLine { depth: 0, row });
        }
    }
    lines
}

fn format_links(row: &RenderRow) -> String {
    row.edges
        .iter()
        .filter(|(_, edge_type)| *edge_type != EdgeType::Parent)
        .map(|(target, edge_type)| match edge_type {
            EdgeType::Blocker => format!("-> {}", target),
            _ => format!("~ {}", target),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ROOT_ID;
    use std::collections::BTreeSet;

    fn sample_result() -> RenderResult {
        let mut root = RenderRow::new(ROOT_ID, "Root", true, false);
        root.edges = vec![(2, EdgeType::Parent), (3, EdgeType::Parent)];
        let mut a = RenderRow::new(2, "A", true, false);
        a.edges = vec![(4, EdgeType::Parent), (3, EdgeType::Blocker)];
        let b = RenderRow::new(3, "B", true, true);
        let c = RenderRow::new(4, "C", false, true);
        RenderResult::new(vec![c, b, a, root], BTreeSet::from([ROOT_ID]))
    }

    #[test]
    fn test_rows_are_listed_as_a_tree() {
        let result = sample_result();
        let lines: Vec<(GoalId, usize)> = format_rows(&result)
            .iter()
            .map(|line| (line.row.goal_id, line.depth))
            .collect();
        assert_eq!(lines, vec![(1, 0), (2, 1), (4, 2), (3, 1)]);
    }

    #[test]
    fn test_unreachable_rows_are_kept() {
        let mut result = sample_result();
        result.roots.clear();
        assert_eq!(format_rows(&result).len(), 4);
    }

    #[test]
    fn test_links_skip_parent_edges() {
        let result = sample_result();
        assert_eq!(format_links(result.by_id(2).unwrap()), "-> 3");
        assert_eq!(format_links(result.by_id(1).unwrap()), "");
    }

    #[test]
    fn test_goal_subcommands_map_to_commands() {
        let cli = Cli::parse_from(["mikado", "link", "-l", "2", "-u", "3", "-e", "relation"]);
        assert_eq!(
            cli.command.to_goal_command(),
            Some(Command::toggle_link(2, 3, EdgeType::Relation))
        );

        let cli = Cli::parse_from(["mikado", "close"]);
        assert_eq!(
            cli.command.to_goal_command(),
            Some(Command::toggle_close(UNSPECIFIED))
        );

        let cli = Cli::parse_from(["mikado", "stats"]);
        assert_eq!(cli.command.to_goal_command(), None);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
