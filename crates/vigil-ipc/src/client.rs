//! Client side of the vigild socket, as used by the platform bridge and by
//! diagnostic tools

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use vigil_api::{
    Command, Event, EventPayload, Request, Response, ResponsePayload, ResponseResult, StateChange,
};

use crate::{IpcError, IpcResult};

/// Connection to vigild. Requests are answered strictly in order.
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
        })
    }

    /// Send a command and wait for the raw response
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        write_json(&mut self.writer, &Request::new(request_id, command)).await?;
        let response: Response = read_json(&mut self.reader).await?;

        if response.request_id != request_id {
            return Err(IpcError::ServerError(format!(
                "response {} does not answer request {}",
                response.request_id, request_id
            )));
        }
        Ok(response)
    }

    /// Send a command; an error response becomes [`IpcError::Rejected`]
    pub async fn call(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(e) => Err(IpcError::Rejected {
                code: e.code,
                message: e.message,
            }),
        }
    }

    /// Forward one voice-state notification. Returns the number of
    /// transitions it caused.
    pub async fn push_state_change(&mut self, change: StateChange) -> IpcResult<usize> {
        match self.call(Command::StateChange(change)).await? {
            ResponsePayload::Applied { transitions } => Ok(transitions),
            other => Err(IpcError::ServerError(format!(
                "unexpected reply to a state change: {:?}",
                other
            ))),
        }
    }

    /// Subscribe to events, consuming the client
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        self.call(Command::SubscribeEvents).await?;

        Ok(EventStream {
            reader: self.reader,
            _writer: self.writer,
        })
    }
}

/// Events pushed by vigild after subscribing
pub struct EventStream {
    reader: BufReader<OwnedReadHalf>,
    // Dropping the write half would make the server treat us as gone
    _writer: OwnedWriteHalf,
}

impl EventStream {
    pub async fn next(&mut self) -> IpcResult<Event> {
        read_json(&mut self.reader).await
    }

    /// Wait for the next `Notify` or `Remove` the bridge has to carry out,
    /// skipping session lifecycle events. A `Shutdown` event ends the stream.
    pub async fn next_enforcement(&mut self) -> IpcResult<EventPayload> {
        loop {
            match self.next().await?.payload {
                payload @ (EventPayload::Notify { .. } | EventPayload::Remove { .. }) => {
                    return Ok(payload);
                }
                EventPayload::Shutdown => return Err(IpcError::ConnectionClosed),
                _ => continue,
            }
        }
    }
}

async fn write_json<T: Serialize>(writer: &mut OwnedWriteHalf, value: &T) -> IpcResult<()> {
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(reader: &mut BufReader<OwnedReadHalf>) -> IpcResult<T> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(IpcError::ConnectionClosed);
    }
    Ok(serde_json::from_str(line.trim())?)
}
