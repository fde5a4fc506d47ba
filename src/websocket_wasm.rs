//! WASM WebSocket attempt for the live-update channel

use std::rc::Rc;
use tracing::{error, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

use crate::core::{Generation, SupervisorEvent};

/// Receives the events of one attempt, tagged with its generation
pub type EventHandler = Rc<dyn Fn(SupervisorEvent)>;

/// One browser WebSocket attempt
///
/// Callbacks are leaked since the browser still delivers `close` after
/// `close()` is called.
pub struct LiveSocket {
    ws: WebSocket,
    generation: Generation,
}

impl LiveSocket {
    /// Open a socket; construction errors come back synchronously
    pub fn open(url: &str, generation: Generation, on_event: EventHandler) -> Result<Self, JsValue> {
        info!(url, generation, "Opening live channel");

        let ws = WebSocket::new(url)?;

        let handler = on_event.clone();
        let on_open = Closure::wrap(Box::new(move |_| {
            handler(SupervisorEvent::Opened { generation });
        }) as Box<dyn Fn(JsValue)>);
        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        on_open.forget();

        let handler = on_event.clone();
        let on_msg = Closure::wrap(Box::new(move |e: MessageEvent| {
            match e.data().dyn_into::<js_sys::JsString>() {
                Ok(txt) => handler(SupervisorEvent::Frame { generation, text: txt.into() }),
                Err(_) => warn!(generation, "Ignoring non-text frame"),
            }
        }) as Box<dyn Fn(MessageEvent)>);
        ws.set_onmessage(Some(on_msg.as_ref().unchecked_ref()));
        on_msg.forget();

        let handler = on_event.clone();
        let on_err = Closure::wrap(Box::new(move |e: ErrorEvent| {
            let msg = e.message();
            error!(error = %msg, generation, "WebSocket error");
            handler(SupervisorEvent::TransportError { generation, error: msg });
        }) as Box<dyn Fn(ErrorEvent)>);
        ws.set_onerror(Some(on_err.as_ref().unchecked_ref()));
        on_err.forget();

        let handler = on_event;
        let on_close = Closure::wrap(Box::new(move |e: CloseEvent| {
            let code = e.code();
            let reason = e.reason();
            warn!(code, reason = %reason, generation, "WebSocket closed");
            handler(SupervisorEvent::Closed { generation, code: Some(code), reason });
        }) as Box<dyn Fn(CloseEvent)>);
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));
        on_close.forget();

        Ok(Self { ws, generation })
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Start the close handshake; `Closed` arrives through the close callback
    pub fn close(&self) {
        if let Err(e) = self.ws.close() {
            error!(?e, generation = self.generation, "Failed to close WebSocket");
        }
    }
}
