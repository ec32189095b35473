use clap::Parser;
use futures::{Sink, SinkExt, StreamExt};
use shared::{Command, Event};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Scripted client: joins a game, optionally starts it, and prints every
/// event until the server closes the connection.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket URL of the server
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,
    /// Game to join
    #[clap(short, long)]
    game: String,
    /// Player name
    #[clap(short, long, default_value = "Player 1")]
    name: String,
    /// Join as admin with this password
    #[clap(short, long)]
    admin_password: Option<String>,
    /// Send BeginGame right after joining
    #[clap(short, long)]
    begin: bool,
}

async fn send<S>(ws: &mut S, command: &Command) -> Result<(), Box<dyn std::error::Error>>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + 'static,
{
    let text = serde_json::to_string(command)?;
    println!("> {}", text);
    ws.send(Message::Text(text.into())).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}", args.url);
    let (mut ws, _) = connect_async(args.url.as_str()).await?;

    let join = Command::JoinGame {
        game_id: args.game.clone(),
        player_name: args.name.clone(),
        admin_password: args.admin_password.clone(),
    };
    send(&mut ws, &join).await?;

    if args.begin {
        send(&mut ws, &Command::BeginGame).await?;
    }

    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => match serde_json::from_str::<Event>(text.as_str()) {
                Ok(event) => println!("< {:?}", event),
                Err(e) => println!("< unreadable event ({}): {}", e, text.as_str()),
            },
            Message::Close(frame) => {
                println!("Server closed the connection: {:?}", frame);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
