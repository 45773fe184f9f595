use std::{path::PathBuf, process::Stdio, time::Duration};

use argh::FromArgs;
use lsp_jsonrpc_client::{lsp::types::Id, Endpoint, LogLevel, LspClient, ResponseFuture};
use lsp_types::{
    notification::{LogMessage, PublishDiagnostics},
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DocumentSymbolParams,
    GotoDefinitionParams, HoverParams, InitializeParams, Position, TextDocumentIdentifier,
    TextDocumentItem, TextDocumentPositionParams,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing_subscriber::EnvFilter;
use url::Url;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(FromArgs)]
// Using block doc comments so that `argh` preserves newlines in help output.
// We need to also write block doc comments without leading space.
/**
Start a Language Server and query it over stdio.
Anything after the option delimiter is used to start the server.

Examples:
  lsp-jsonrpc-client -- langserver --stdio
  lsp-jsonrpc-client -f src/main.rs --symbols -- rust-analyzer
  lsp-jsonrpc-client -f src/main.rs --hover 10:4 -l debug -- rust-analyzer
*/
struct Options {
    /// log level: off, error, warn, info, debug or trace (default: info)
    #[argh(option, short = 'l', default = "LogLevel::Info")]
    log_level: LogLevel,
    /// timeout in seconds for each request, 0 to wait forever (default: 30)
    #[argh(option, short = 't', default = "30")]
    timeout: u64,
    /// text document to open
    #[argh(option, short = 'f')]
    file: Option<PathBuf>,
    /// language id of the document (default: from the file extension)
    #[argh(option)]
    language_id: Option<String>,
    /// request hover at zero-based LINE:CHARACTER
    #[argh(option, from_str_fn(parse_position))]
    hover: Option<Position>,
    /// request definition at zero-based LINE:CHARACTER
    #[argh(option, from_str_fn(parse_position))]
    definition: Option<Position>,
    /// request document symbols
    #[argh(switch)]
    symbols: bool,
    /// show version and exit
    #[argh(switch, short = 'v')]
    version: bool,
}

// Large enough value used to disable the request timeout.
const NO_TIMEOUT: u64 = 60 * 60 * 24 * 30 * 12;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let (opts, command) = get_opts_and_command()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let timeout = if opts.timeout == 0 {
        Duration::from_secs(NO_TIMEOUT)
    } else {
        Duration::from_secs(opts.timeout)
    };
    let cwd = std::env::current_dir()?;
    let root_uri = Url::from_directory_path(&cwd)
        .map_err(|_| format!("{} cannot be used as root uri", cwd.display()))?;

    let mut server = Command::new(&command[0])
        .args(&command[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let stdin = server.stdin.take().ok_or("server stdin is not piped")?;
    let stdout = server.stdout.take().ok_or("server stdout is not piped")?;
    let endpoint = Endpoint::builder()
        .name(command[0].as_str())
        .log_level(opts.log_level)
        .spawn(stdin, stdout);
    let client = LspClient::new(endpoint);
    handle_server_messages(&client);

    let params: InitializeParams = serde_json::from_value(json!({
        "processId": std::process::id(),
        "rootUri": root_uri.as_str(),
        "capabilities": {
            "textDocument": {
                "hover": {"contentFormat": ["markdown", "plaintext"]},
                "documentSymbol": {"hierarchicalDocumentSymbolSupport": true}
            },
            "workspace": {"configuration": true}
        },
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))?;
    let initialized = wait(client.initialize(params), timeout).await?;
    if let Some(info) = &initialized.server_info {
        tracing::info!(
            "initialized {} {}",
            info.name,
            info.version.as_deref().unwrap_or("")
        );
    }
    client.initialized()?;

    if let Some(path) = &opts.file {
        let path = cwd.join(path);
        let uri = Url::from_file_path(&path)
            .map_err(|_| format!("{} cannot be used as document uri", path.display()))?;
        let language_id = match &opts.language_id {
            Some(id) => id.clone(),
            None => language_id(&path),
        };
        let text = tokio::fs::read_to_string(&path).await?;
        client.did_open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem::new(uri.clone(), language_id, 0, text),
        })?;

        let document = TextDocumentIdentifier::new(uri);
        if opts.symbols {
            let symbols = client.document_symbol(DocumentSymbolParams {
                text_document: document.clone(),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            });
            print_json(&wait(symbols, timeout).await?)?;
        }
        if let Some(position) = opts.hover {
            let hover = client.hover(HoverParams {
                text_document_position_params: TextDocumentPositionParams::new(
                    document.clone(),
                    position,
                ),
                work_done_progress_params: Default::default(),
            });
            print_json(&wait(hover, timeout).await?)?;
        }
        if let Some(position) = opts.definition {
            let definition = client.definition(GotoDefinitionParams {
                text_document_position_params: TextDocumentPositionParams::new(
                    document.clone(),
                    position,
                ),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            });
            print_json(&wait(definition, timeout).await?)?;
        }

        client.did_close(DidCloseTextDocumentParams {
            text_document: document,
        })?;
    }

    wait(client.shutdown(), timeout).await?;
    client.exit()?;
    match tokio::time::timeout(timeout, server.wait()).await {
        Ok(status) => {
            let status = status?;
            tracing::info!("server exited with {}", status);
        }
        Err(_) => tracing::warn!("server did not exit, killing it"),
    }

    Ok(())
}

/// Answer the requests servers commonly send during startup, and log what
/// they tell the user.
fn handle_server_messages(client: &LspClient) {
    let responder = client.clone();
    client.on_request("workspace/configuration", move |params, id| {
        let items = params["items"].as_array().map_or(0, |items| items.len());
        respond(&responder, id, vec![Value::Null; items]);
    });

    for method in &["client/registerCapability", "window/workDoneProgress/create"] {
        let responder = client.clone();
        client.on_request(method, move |_, id| respond(&responder, id, ()));
    }

    let responder = client.clone();
    client.on_request("workspace/applyEdit", move |_, id| {
        respond(&responder, id, json!({"applied": false}));
    });

    client.on_notification::<LogMessage, _>(|params| {
        tracing::info!(kind = ?params.typ, "server: {}", params.message);
    });
    client.on_notification::<PublishDiagnostics, _>(|params| {
        tracing::info!(
            uri = %params.uri,
            "{} diagnostic(s)",
            params.diagnostics.len()
        );
    });
}

fn respond<T: Serialize>(client: &LspClient, id: Option<&Id>, result: T) {
    if let Some(id) = id {
        if let Err(err) = client.respond_to_server_request(id.clone(), result) {
            tracing::error!("failed to respond to {}: {}", id, err);
        }
    }
}

async fn wait<T>(response: ResponseFuture<T>, timeout: Duration) -> Result<T, BoxError>
where
    T: DeserializeOwned,
{
    let method = response.method().to_owned();
    match tokio::time::timeout(timeout, response).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(format!("{} timed out after {}s", method, timeout.as_secs()).into()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn language_id(path: &std::path::Path) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    match extension {
        "rs" => "rust",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "py" => "python",
        "rb" => "ruby",
        "hs" => "haskell",
        "cs" => "csharp",
        "md" => "markdown",
        ext => ext,
    }
    .to_owned()
}

fn get_opts_and_command() -> Result<(Options, Vec<String>), BoxError> {
    let strings: Vec<String> = std::env::args().collect();
    let splitted: Vec<&[String]> = strings.splitn(2, |s| *s == "--").collect();
    let strs: Vec<&str> = splitted[0].iter().map(|s| s.as_str()).collect();

    // Parse options or show help and exit.
    let opts = Options::from_args(&[strs[0]], &strs[1..]).unwrap_or_else(|early_exit| {
        // show generated help message
        println!("{}", early_exit.output);
        std::process::exit(match early_exit.status {
            Ok(()) => 0,
            Err(()) => 1,
        })
    });

    if opts.version {
        println!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    match splitted.get(1) {
        Some(command) if !command.is_empty() => Ok((opts, command.to_vec())),
        _ => Err("Command to start the server is required. See --help for examples.".into()),
    }
}

fn parse_position(value: &str) -> Result<Position, String> {
    let invalid = || format!("{} is not LINE:CHARACTER", value);
    let (line, character) = value.split_once(':').ok_or_else(invalid)?;
    Ok(Position {
        line: line.parse().map_err(|_| invalid())?,
        character: character.parse().map_err(|_| invalid())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positions() {
        let position = parse_position("10:4").unwrap();
        assert_eq!(position.line, 10);
        assert_eq!(position.character, 4);
        assert!(parse_position("10").is_err());
        assert!(parse_position("a:4").is_err());
        assert!(parse_position("-1:4").is_err());
    }

    #[test]
    fn language_id_from_extension() {
        assert_eq!(language_id(std::path::Path::new("src/main.rs")), "rust");
        assert_eq!(language_id(std::path::Path::new("index.mjs")), "javascript");
        assert_eq!(language_id(std::path::Path::new("main.go")), "go");
        assert_eq!(language_id(std::path::Path::new("Makefile")), "");
    }
}
