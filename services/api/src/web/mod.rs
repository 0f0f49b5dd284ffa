pub mod chat_task;
pub mod diary;
pub mod live_ws;
pub mod persist_task;
pub mod protocol;
pub mod rest;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export the WebSocket handler and the persistence task so the binary can
// build the router and start the background work.
pub use live_ws::live_ws_handler;
pub use persist_task::persistence_process;
