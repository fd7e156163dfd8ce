//! Conversation turn loop
//!
//! One `send` drives: dispatch the current model, on failure advance down
//! the strategy list with a visible switch notice, on tool calls append
//! the simulated results and continue the conversation, on cancellation
//! stop silently. The loop carries its own outbound history so that
//! switch notices land in the conversation without contaminating the
//! requests of the same turn.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::catalog::ModelDescriptor;
use crate::core::chat::{AttachedFile, Chat, StoredMessage};
use crate::core::dispatch::Dispatcher;
use crate::core::providers::{Credentials, LocalServerConfig};

/// Appended when the strategy has no model to try at all.
pub const NO_MODELS_MESSAGE: &str = "**All models failed.**";
/// Appended exactly once when every model in the strategy has failed.
pub const EXHAUSTED_MESSAGE: &str = "**All available models failed.**";
/// The simulated result recorded for every tool call.
pub const SIMULATED_TOOL_RESULT: &str = "Tool executed successfully. (Simulated)";

/// The states a turn moves through. `AwaitingToolResolution` exists as an
/// explicit stop on the way back into `Dispatching`: the simulated tool
/// results have been appended and the extended history goes out next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Dispatching(usize),
    AwaitingToolResolution(usize),
    Idle(usize),
    Stopped,
    Exhausted,
}

/// How a turn ended. `Completed` carries the index of the model that
/// produced the final reply; it becomes the strategy's new current index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { model_index: usize },
    Stopped,
    Exhausted,
}

/// Everything a turn needs, passed as explicit snapshots. The loop never
/// reaches into global state.
pub struct TurnContext<'a> {
    pub dispatcher: &'a dyn Dispatcher,
    pub credentials: &'a Credentials,
    pub local: &'a LocalServerConfig,
    pub models: &'a [ModelDescriptor],
}

/// Run one conversation turn against `chat`, starting at `start_index` in
/// the strategy list.
///
/// Messages are appended to `chat` as the turn progresses; persistence is
/// the caller's job once the turn reaches a terminal state. Cancellation
/// is silent: an aborted dispatch appends nothing.
pub async fn run_turn(
    ctx: &TurnContext<'_>,
    chat: &mut Chat,
    start_index: usize,
    files: Option<&[AttachedFile]>,
    cancel: &CancellationToken,
) -> TurnOutcome {
    let mut outbound: Vec<StoredMessage> = chat.messages.clone();
    let mut state = TurnState::Dispatching(start_index);

    loop {
        match state {
            TurnState::Dispatching(index) => {
                let Some(model) = ctx.models.get(index) else {
                    chat.push(StoredMessage::assistant_note(NO_MODELS_MESSAGE));
                    state = TurnState::Exhausted;
                    continue;
                };

                debug!(model = %model.id, index, "attempting dispatch");
                let attempt = ctx
                    .dispatcher
                    .dispatch(model, ctx.credentials, ctx.local, &outbound, files, cancel)
                    .await;

                match attempt {
                    Ok(reply) if reply.tool_calls.is_empty() => {
                        chat.push(StoredMessage::assistant(reply.text, model.id.clone()));
                        state = TurnState::Idle(index);
                    }
                    Ok(reply) => {
                        let call_message =
                            StoredMessage::tool_call(reply.tool_calls.clone(), model.id.clone());
                        outbound.push(call_message.clone());
                        chat.push(call_message);

                        for call in &reply.tool_calls {
                            let result_message = StoredMessage::tool_result(
                                call.id.clone(),
                                call.name.clone(),
                                SIMULATED_TOOL_RESULT,
                            );
                            outbound.push(result_message.clone());
                            chat.push(result_message);
                        }
                        state = TurnState::AwaitingToolResolution(index);
                    }
                    Err(err) if err.is_abort() => {
                        state = TurnState::Stopped;
                    }
                    Err(err) => {
                        warn!(model = %model.id, "dispatch failed: {err}");
                        match ctx.models.get(index + 1) {
                            Some(next) => {
                                let notice = format!(
                                    "**{}** failed.\n> *{err}*\n\nSwitching to **{}**.",
                                    model.id, next.id
                                );
                                chat.push(StoredMessage::assistant_note(notice));
                                state = TurnState::Dispatching(index + 1);
                            }
                            None => {
                                chat.push(StoredMessage::assistant_note(EXHAUSTED_MESSAGE));
                                state = TurnState::Exhausted;
                            }
                        }
                    }
                }
            }
            TurnState::AwaitingToolResolution(index) => {
                // Conversation continuation with the extended history, not
                // a new user turn.
                state = TurnState::Dispatching(index);
            }
            TurnState::Idle(model_index) => return TurnOutcome::Completed { model_index },
            TurnState::Stopped => return TurnOutcome::Stopped,
            TurnState::Exhausted => return TurnOutcome::Exhausted,
        }
    }
}
