//! Interactive console client for the matching engine's websocket feed.
//!
//! Reads commands from stdin, sends them as websocket frames and prints
//! whatever the server pushes back (depth updates, trades, acks, errors).

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMsg};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    api::{Numeric, OrderRequest},
    errors::ClientError,
    ws::{ClientFrame, WsFrame},
};

enum Action {
    Send(ClientFrame),
    Help,
    Quit,
    Nothing,
}

fn print_help() {
    println!("\nAvailable commands:");
    println!("  help                    - Show this help message");
    println!("  order <symbol> <type> <side> <quantity> [price] - Place an order");
    println!("    types: market, limit, ioc, fok");
    println!("    sides: buy, sell");
    println!("  subscribe <symbol>      - Subscribe to market data");
    println!("  unsubscribe <symbol>    - Unsubscribe from market data");
    println!("  quit                    - Exit the program");
}

fn parse_command(line: &str) -> Result<Action, String> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(Action::Nothing);
    };
    match cmd {
        "quit" => Ok(Action::Quit),
        "help" => Ok(Action::Help),
        "subscribe" => {
            let symbol = parts
                .next()
                .ok_or_else(|| "usage: subscribe <symbol>".to_string())?
                .to_string();
            Ok(Action::Send(ClientFrame::Subscribe { symbol }))
        }
        "unsubscribe" => {
            let symbol = parts
                .next()
                .ok_or_else(|| "usage: unsubscribe <symbol>".to_string())?
                .to_string();
            Ok(Action::Send(ClientFrame::Unsubscribe { symbol }))
        }
        "order" => {
            let usage = || "usage: order <symbol> <type> <side> <quantity> [price]".to_string();
            let symbol = parts.next().ok_or_else(usage)?.to_string();
            let order_type = parts.next().ok_or_else(usage)?.to_string();
            let side = parts.next().ok_or_else(usage)?.to_string();
            let quantity: f64 = parts
                .next()
                .ok_or_else(usage)?
                .parse()
                .map_err(|_| "invalid quantity".to_string())?;
            let price = match parts.next() {
                Some(raw) => Some(Numeric::Number(
                    raw.parse().map_err(|_| "invalid price".to_string())?,
                )),
                None => None,
            };
            Ok(Action::Send(ClientFrame::Order(OrderRequest {
                symbol,
                order_type,
                side,
                quantity: Numeric::Number(quantity),
                price,
            })))
        }
        other => Err(format!(
            "unknown command `{other}`; type 'help' for the command list"
        )),
    }
}

fn print_frame(frame: &WsFrame) {
    match frame {
        WsFrame::Depth(depth) => {
            println!(
                "[depth] {} bids={:?} asks={:?}",
                depth.symbol, depth.bids, depth.asks
            );
        }
        WsFrame::Trade(trade) => {
            println!(
                "[trade] {} {} {} @ {} (maker {}, taker {})",
                trade.symbol,
                trade.aggressor_side,
                trade.quantity,
                trade.price,
                trade.maker_order_id,
                trade.taker_order_id
            );
        }
        WsFrame::Ack(ack) => {
            println!(
                "[ack] order {} accepted with {} execution(s)",
                ack.order_id,
                ack.executions.len()
            );
            for trade in &ack.executions {
                println!("  filled {} @ {}", trade.quantity, trade.price);
            }
        }
        WsFrame::Error { message } => println!("[error] {message}"),
    }
}

/// Connects to the feed at `url` and runs the interactive loop until the
/// user quits, the server hangs up, or `token` is cancelled.
pub async fn run_client(url: &str, token: CancellationToken) -> Result<(), ClientError> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;
    println!("Connected to {url}");
    let (mut write, mut read) = ws.split();

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                println!("\nshutting down...");
                break;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match parse_command(line.trim()) {
                    Ok(Action::Quit) => break,
                    Ok(Action::Help) => print_help(),
                    Ok(Action::Nothing) => {}
                    Ok(Action::Send(frame)) => {
                        let text = serde_json::to_string(&frame)
                            .map_err(|e| ClientError::Send(e.to_string()))?;
                        write
                            .send(WsMsg::Text(text.into()))
                            .await
                            .map_err(|e| ClientError::Send(e.to_string()))?;
                    }
                    Err(msg) => println!("{msg}"),
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMsg::Text(text))) => match serde_json::from_str::<WsFrame>(&text) {
                        Ok(frame) => print_frame(&frame),
                        Err(e) => warn!(error = %e, "unparseable frame from server"),
                    },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        println!("connection error: {e}");
                        break;
                    }
                    None => {
                        println!("server closed the connection");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_command() {
        let action = parse_command("order BTC-USDT limit buy 2.5 50000").unwrap();
        let Action::Send(ClientFrame::Order(req)) = action else {
            panic!("expected an order frame");
        };
        assert_eq!(req.symbol, "BTC-USDT");
        assert_eq!(req.order_type, "limit");
        assert_eq!(req.side, "buy");
        assert!(matches!(req.quantity, Numeric::Number(q) if q == 2.5));
        assert!(matches!(req.price, Some(Numeric::Number(p)) if p == 50000.0));
    }

    #[test]
    fn test_parse_market_order_without_price() {
        let action = parse_command("order BTC-USDT market sell 1").unwrap();
        let Action::Send(ClientFrame::Order(req)) = action else {
            panic!("expected an order frame");
        };
        assert!(req.price.is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_commands() {
        assert!(parse_command("order BTC-USDT limit buy").is_err());
        assert!(parse_command("order BTC-USDT limit buy abc").is_err());
        assert!(parse_command("subscribe").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_blank_line_is_ignored() {
        assert!(matches!(parse_command(""), Ok(Action::Nothing)));
    }
}
