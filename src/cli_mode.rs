//! Interactive CLI mode
//!
//! Every command typed at the prompt, or passed on the command line, goes
//! through the router, so job commands land on the node that owns the job.

use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::cluster::Topology;
use crate::router::DisqueRouter;
use crate::utils::RespValue;

/// Print the discovered topology
pub async fn run_nodes(router: &DisqueRouter) -> anyhow::Result<()> {
    let topology = router.refresh().await?;
    print_topology(&topology);
    Ok(())
}

/// Route a single command and print its reply (non-interactive)
pub async fn run_command(router: &DisqueRouter, command_args: &[String]) -> anyhow::Result<()> {
    let Some((name, args)) = command_args.split_first() else {
        return Err(anyhow::anyhow!("No command given"));
    };

    wait_for_topology(router).await;
    let response = router.command(name, args).await?;
    print_response(&response, 0);
    Ok(())
}

/// Run the Read-Eval-Print Loop
pub async fn run_repl(router: &DisqueRouter) -> anyhow::Result<()> {
    wait_for_topology(router).await;
    let topology = router.topology();
    eprintln!(
        "Connected to {} node(s). Type 'help' for available commands, 'quit' or Ctrl-D to exit.\n",
        topology.num_connections()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        print!("disque> ");
        stdout.flush()?;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                // EOF (Ctrl-D)
                println!();
                break;
            }
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                continue;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Handle special commands
        match line.to_lowercase().as_str() {
            "quit" | "exit" => break,
            "help" => {
                print_help();
                continue;
            }
            "clear" => {
                // Clear screen (ANSI escape)
                print!("\x1b[2J\x1b[H");
                stdout.flush()?;
                continue;
            }
            "nodes" => {
                match router.refresh().await {
                    Ok(topology) => print_topology(&topology),
                    Err(e) => eprintln!("(error) {}", e),
                }
                continue;
            }
            _ => {}
        }

        let args = parse_command_line(line);
        let Some((name, rest)) = args.split_first() else {
            continue;
        };

        match router.command(name, rest).await {
            Ok(response) => print_response(&response, 0),
            Err(e) => eprintln!("(error) {}", e),
        }
    }

    Ok(())
}

/// Let startup discovery finish so the first command can use affinity
async fn wait_for_topology(router: &DisqueRouter) {
    if let Err(e) = router.refresh().await {
        warn!("Topology discovery failed, routing to seed nodes: {}", e);
    }
}

fn print_topology(topology: &Topology) {
    for conn in topology.node_list() {
        match conn.node() {
            Some(node) => println!("{} {} priority={}", node.id, conn.address(), node.priority),
            None => println!("(unknown) {}", conn.address()),
        }
    }
}

/// Parse a command line into arguments, handling quotes
fn parse_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in line.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if !in_single_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ' ' | '\t' if !in_single_quote && !in_double_quote => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Render a reply the way valkey-cli does
fn format_response(resp: &RespValue, indent: usize, out: &mut String) {
    let prefix = "  ".repeat(indent);

    match resp {
        RespValue::Array(items) if items.is_empty() => {
            out.push_str(&prefix);
            out.push_str("(empty array)\n");
        }
        RespValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                out.push_str(&format!("{}{}) ", prefix, i + 1));
                match item {
                    RespValue::Array(_) => {
                        out.push('\n');
                        format_response(item, indent + 1, out);
                    }
                    _ => format_scalar(item, out),
                }
            }
        }
        RespValue::BulkString(data) => match std::str::from_utf8(data) {
            // Multi-line text (INFO, CLUSTER NODES)
            Ok(s) if s.contains('\n') => {
                for line in s.lines() {
                    out.push_str(&format!("{}{}\n", prefix, line));
                }
            }
            _ => {
                out.push_str(&prefix);
                format_scalar(resp, out);
            }
        },
        _ => {
            out.push_str(&prefix);
            format_scalar(resp, out);
        }
    }
}

fn format_scalar(resp: &RespValue, out: &mut String) {
    let line = match resp {
        RespValue::SimpleString(s) => s.clone(),
        RespValue::Error(e) => format!("(error) {}", e),
        RespValue::Integer(n) => format!("(integer) {}", n),
        RespValue::BulkString(data) => match std::str::from_utf8(data) {
            Ok(s) => format!("\"{}\"", s),
            Err(_) => format!("(binary) {} bytes", data.len()),
        },
        RespValue::Null => "(nil)".to_string(),
        RespValue::Array(items) => format!("(array) {} items", items.len()),
    };
    out.push_str(&line);
    out.push('\n');
}

fn print_response(resp: &RespValue, indent: usize) {
    let mut out = String::new();
    format_response(resp, indent, &mut out);
    print!("{}", out);
}

/// Print help message
fn print_help() {
    println!(
        r#"
disque-router CLI mode
================================

Commands are routed to the node that owns the job IDs they mention.

Built-in commands:
  help     Show this help message
  nodes    Refresh and show cluster topology
  quit     Exit the CLI (or use Ctrl-D)
  exit     Exit the CLI
  clear    Clear the screen

Example commands:
  ADDJOB queue body 0        Add a job
  GETJOB FROM queue          Fetch a job
  ACKJOB <id> [<id> ...]     Acknowledge jobs (routed to their node)
  SHOW <id>                  Inspect a job
  QLEN queue                 Queue length
  HELLO                      Cluster membership

Tip: Use quotes for values with spaces: ADDJOB queue "hello world" 0
"#
    );
}
