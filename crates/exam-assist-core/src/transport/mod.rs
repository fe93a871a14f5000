//! Newline-delimited JSON over stdio: one [`Command`] per input line, one [`Frame`] per output line.

use anyhow::Result;
use futures::StreamExt;
use serde::Serialize;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::{controller::Command, repository::QuestionRepository, session::SessionDriver, session::SessionEvent};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Event(SessionEvent),
    Error { message: String },
}

pub async fn serve_stdio<R>(driver: SessionDriver<R>) -> Result<()>
where
    R: QuestionRepository + 'static,
{
    serve(driver, io::stdin(), io::stdout()).await
}

/// Runs the session until input closes and every pending call has resolved.
pub async fn serve<R, I, O>(mut driver: SessionDriver<R>, input: I, mut output: O) -> Result<()>
where
    R: QuestionRepository + 'static,
    I: tokio::io::AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut lines = FramedRead::new(input, LinesCodec::new());
    let mut input_open = true;

    loop {
        let frame = tokio::select! {
            line = lines.next(), if input_open => match line {
                Some(Ok(line)) => decode(&mut driver, &line),
                Some(Err(error)) => {
                    warn!(target: "exam_assist_transport", error = %error, "failed to read input line");
                    Some(Frame::Error { message: error.to_string() })
                }
                None => {
                    info!(target: "exam_assist_transport", "input closed; draining pending calls");
                    input_open = false;
                    None
                }
            },
            event = driver.next_completion(), if driver.has_pending() => event.map(Frame::Event),
            else => break,
        };

        if let Some(frame) = frame {
            write_frame(&mut output, &frame).await?;
        }
    }

    Ok(())
}

fn decode<R>(driver: &mut SessionDriver<R>, line: &str) -> Option<Frame>
where
    R: QuestionRepository + 'static,
{
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    debug!(target: "exam_assist_transport", request = line);
    match serde_json::from_str::<Command>(line) {
        Ok(command) => Some(Frame::Event(driver.dispatch(command))),
        Err(error) => {
            warn!(target: "exam_assist_transport", error = %error, "failed to parse command");
            Some(Frame::Error {
                message: format!("invalid command: {error}"),
            })
        }
    }
}

async fn write_frame<O>(output: &mut O, frame: &Frame) -> Result<()>
where
    O: AsyncWrite + Unpin,
{
    let payload = serde_json::to_string(frame)?;
    output.write_all(payload.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
