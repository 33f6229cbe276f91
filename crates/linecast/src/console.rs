//! Terminal chat client: stdin lines out, inbound lines to stdout.

use anyhow::{Context, Result};
use linecast_client::format::{departure_message, user_message_now};
use linecast_client::{Inbound, LineClient};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// How a console session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The user typed the exit command.
    ExitCommand,
    /// Input reached end of file.
    InputClosed,
    /// The server closed the connection.
    ServerClosed,
}

/// Console session settings.
#[derive(Clone, Debug)]
pub struct ConsoleOptions {
    /// Display name put in front of every message.
    pub name: String,
    /// Input line that leaves the chat.
    pub exit_command: String,
    /// Line printed locally before anything else.
    pub greeting: Option<String>,
}

/// Relay `input` to the server and inbound lines to `output` until the user
/// leaves or the server goes away.
///
/// Leaving (exit command or end of input) announces the departure to the
/// other participants before the connection is closed.
pub async fn run<I, O>(
    client: LineClient,
    mut inbound: Inbound,
    options: &ConsoleOptions,
    input: I,
    mut output: O,
) -> Result<ConsoleExit>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    if let Some(greeting) = &options.greeting {
        write_line(&mut output, greeting).await?;
    }

    let mut input = input.lines();
    let exit = loop {
        tokio::select! {
            typed = input.next_line() => {
                let Some(text) = typed.context("failed to read console input")? else {
                    break ConsoleExit::InputClosed;
                };
                if text.trim() == options.exit_command {
                    break ConsoleExit::ExitCommand;
                }
                client
                    .send_line(user_message_now(&options.name, &text))
                    .await
                    .context("failed to send message")?;
            }
            received = inbound.recv() => {
                let Some(line) = received else {
                    write_line(&mut output, "Connection closed by server.").await?;
                    break ConsoleExit::ServerClosed;
                };
                write_line(&mut output, &line).await?;
            }
        }
    };

    if exit != ConsoleExit::ServerClosed {
        if let Err(error) = client.send_line(departure_message(&options.name)).await {
            debug!(%error, "could not announce departure");
        }
    }
    client.close().await;
    Ok(exit)
}

async fn write_line<O>(output: &mut O, text: &str) -> Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
