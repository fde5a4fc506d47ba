//! Terminal client for the table chat
//!
//! Run with: cargo run --features cli -- [table]

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use table_chat::config::ClientConfig;
    use table_chat::core::{parse_table_id, Endpoints};
    use table_chat::http::HttpApi;
    use table_chat::runtime_native::LiveChannel;
    use table_chat::session::ChatSession;
    use table_chat::terminal::TerminalSink;
    use table_chat::websocket_native::TungsteniteConnector;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tracing::{info, warn};
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,table_chat=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let mut config = ClientConfig::from_env()?;
    if let Some(arg) = std::env::args().nth(1) {
        config.table_id = Some(parse_table_id(&arg)?);
    }
    info!(url = %config.base_url, table = ?config.table_id, "Joining table chat");

    let api = Arc::new(HttpApi::new(Endpoints::new(&config.base_url)?));
    let sink = TerminalSink::stdout(config.table_id);
    let presence = sink.presence();
    let channel = LiveChannel::spawn(&config, api.clone(), TungsteniteConnector, sink)?;
    let mut session = ChatSession::new(&config, api);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let mut words = line.split_whitespace();

        let outcome = match words.next() {
            Some("/quit") => break,
            Some("/status") => {
                println!("-- {} ({})", channel.status().label(), channel.status());
                Ok(())
            }
            Some("/w") => match words.next().map(parse_table_id) {
                Some(Ok(table)) => {
                    let nickname = presence.lock().nickname_of(table);
                    println!("-- Private chat with {}. /all to leave", nickname);
                    session.start_private(table, nickname);
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => {
                    println!("-- usage: /w <table>");
                    Ok(())
                }
            },
            Some("/all") => {
                session.stop_private();
                Ok(())
            }
            Some("/gift") => match words.next().map(parse_table_id) {
                Some(Ok(table)) => session.choose_recipient(table),
                Some(Err(e)) => Err(e),
                None => {
                    println!("-- usage: /gift <table>");
                    Ok(())
                }
            },
            Some("/add") | Some("/remove") => {
                let remove = line.starts_with("/remove");
                match words.next() {
                    Some(item) => {
                        let qty = words.next().and_then(|q| q.parse::<i32>().ok()).unwrap_or(1);
                        let delta = if remove { -qty } else { qty };
                        let left = session.basket_mut().change(item, delta);
                        println!("-- {} x{}", item, left);
                    }
                    None => println!("-- usage: /add <item> [qty]"),
                }
                Ok(())
            }
            Some("/order") => {
                let note = line.trim_start_matches("/order").trim();
                let note = (!note.is_empty()).then_some(note);
                session.submit_gift(note).await.map(|receipt| {
                    println!("-- Gift order #{} sent", receipt.order_id);
                })
            }
            _ => session.send(&line).await.map(|sent| {
                if sent {
                    channel.refresh_presence();
                }
            }),
        };

        if let Err(e) = outcome {
            warn!(error = %e, "Command failed");
            println!("!! {}", e);
        }
    }

    channel.shutdown().await;
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
