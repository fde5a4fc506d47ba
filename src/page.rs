//! Browser driver for the chat page
//!
//! The page owns one `Supervisor` behind `Rc<RefCell<_>>`. WebSocket
//! callbacks, window timers and fetch completions all feed events back through
//! [`handle`], which runs supervisor commands until the queue drains.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, Element, Event, HtmlElement, HtmlInputElement, KeyboardEvent, Window};

use crate::config::ClientConfig;
use crate::core::sink::format_amount;
use crate::core::{
    dispatch, escape_html, parse_table_id, ChannelStatus, ChatMessage, Command, Endpoints,
    EventSink, GiftOrder, InboundEvent, MessageView, MessagesQuery, OutgoingMessage, PollCursor,
    Presence, RetryPolicy, SeenMessages, Supervisor, SupervisorEvent, SystemMessage, TableId,
};
use crate::http::HttpApi;
use crate::websocket_wasm::{EventHandler, LiveSocket};

type SharedPage = Rc<RefCell<Page>>;

#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();

    // Initialize tracing for browser console
    tracing_wasm::set_as_global_default();

    if let Err(e) = boot() {
        error!(?e, "Chat page failed to start");
    }
}

fn boot() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or("no window")?;
    let document = window.document().ok_or("no document")?;
    let Some(container) = document.get_element_by_id("chat-container") else {
        warn!("No chat container on this page");
        return Ok(());
    };
    let Some(raw_table) = container.get_attribute("data-table-id") else {
        info!("No table selected yet, live channel stays idle");
        return Ok(());
    };
    let table_id = match parse_table_id(&raw_table) {
        Ok(id) => id,
        Err(e) => {
            window.alert_with_message(&e.to_string())?;
            return Ok(());
        }
    };

    let origin = window.location().origin()?;
    let config = ClientConfig::new(origin, table_id);
    let endpoints = Endpoints::new(&config.base_url).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let page = Rc::new(RefCell::new(Page::new(window, document, config, endpoints)));

    load_history(&page);
    start_presence(&page)?;
    bind_input(&page)?;
    bind_unload(&page)?;
    handle(&page, SupervisorEvent::Connect);
    Ok(())
}

struct PollRun {
    id: u64,
    handle: i32,
    cursor: PollCursor,
    _tick: Closure<dyn FnMut()>,
}

struct Page {
    window: Window,
    config: ClientConfig,
    endpoints: Endpoints,
    api: HttpApi,
    supervisor: Supervisor,
    sink: DomSink,
    live: Option<LiveSocket>,
    poller: Option<PollRun>,
    poll_runs: u64,
    reconnect: Option<i32>,
    seen: SeenMessages,
    private_target: Option<TableId>,
}

impl Page {
    fn new(window: Window, document: Document, config: ClientConfig, endpoints: Endpoints) -> Self {
        let policy = RetryPolicy {
            max_attempts: config.max_reconnect_attempts,
            delay: config.reconnect_delay,
        };
        Self {
            api: HttpApi::new(endpoints.clone()),
            supervisor: Supervisor::new(config.table_id, policy),
            sink: DomSink::new(document, config.table_id),
            window,
            config,
            endpoints,
            live: None,
            poller: None,
            poll_runs: 0,
            reconnect: None,
            seen: SeenMessages::default(),
            private_target: None,
        }
    }

    fn deliver(&mut self, event: &InboundEvent) {
        if let InboundEvent::ChatMessage(msg) = event {
            if !self.seen.first_sighting(msg) {
                debug!(id = msg.id, "Skipping message already shown");
                return;
            }
        }
        dispatch(event, self.config.table_id, &mut self.sink);
    }

    fn accept_polled(&mut self, run_id: u64, batch: Vec<ChatMessage>) {
        let fresh = match self.poller.as_mut() {
            Some(run) if run.id == run_id => run.cursor.accept(batch),
            _ => return,
        };
        for msg in fresh {
            self.deliver(&InboundEvent::ChatMessage(msg));
        }
    }
}

/// Feed one event to the supervisor and run the resulting commands
fn handle(page: &SharedPage, event: SupervisorEvent) {
    let mut queue = VecDeque::from([event]);
    while let Some(event) = queue.pop_front() {
        let commands = page.borrow_mut().supervisor.handle(event);
        for command in commands {
            if let Some(follow_up) = execute(page, command) {
                queue.push_back(follow_up);
            }
        }
    }
}

fn execute(page: &SharedPage, command: Command) -> Option<SupervisorEvent> {
    match command {
        Command::OpenLive { generation, table_id } => {
            let url = match page.borrow().endpoints.live_url(table_id) {
                Ok(url) => url,
                Err(e) => {
                    return Some(SupervisorEvent::ConstructionFailed { generation, error: e.to_string() })
                }
            };
            let shared = page.clone();
            let on_event: EventHandler = Rc::new(move |event: SupervisorEvent| handle(&shared, event));
            match LiveSocket::open(url.as_str(), generation, on_event) {
                Ok(socket) => page.borrow_mut().live = Some(socket),
                Err(e) => {
                    return Some(SupervisorEvent::ConstructionFailed {
                        generation,
                        error: format!("{:?}", e),
                    })
                }
            }
        }
        Command::CloseLive { generation } => {
            let mut p = page.borrow_mut();
            if p.live.as_ref().is_some_and(|l| l.generation() == generation) {
                if let Some(socket) = p.live.take() {
                    socket.close();
                }
            }
        }
        Command::StartPoller => start_poller(page),
        Command::StopPoller => {
            let mut p = page.borrow_mut();
            if let Some(run) = p.poller.take() {
                p.window.clear_interval_with_handle(run.handle);
                info!("Polling stopped");
            }
        }
        Command::ScheduleReconnect { delay } => {
            let shared = page.clone();
            let fire = Closure::once_into_js(move || {
                shared.borrow_mut().reconnect = None;
                handle(&shared, SupervisorEvent::ReconnectDue);
            });
            let mut p = page.borrow_mut();
            if let Some(previous) = p.reconnect.take() {
                p.window.clear_timeout_with_handle(previous);
            }
            match p
                .window
                .set_timeout_with_callback_and_timeout_and_arguments_0(fire.unchecked_ref(), millis(delay))
            {
                Ok(handle) => p.reconnect = Some(handle),
                Err(e) => error!(?e, "Failed to schedule reconnect"),
            }
        }
        Command::CancelReconnect => {
            let mut p = page.borrow_mut();
            if let Some(timer) = p.reconnect.take() {
                p.window.clear_timeout_with_handle(timer);
            }
        }
        Command::Deliver(event) => page.borrow_mut().deliver(&event),
        Command::StatusChanged(status) => page.borrow_mut().sink.status_changed(status),
    }
    None
}

fn start_poller(page: &SharedPage) {
    let mut p = page.borrow_mut();
    if p.poller.is_some() {
        return;
    }
    p.poll_runs += 1;
    let id = p.poll_runs;
    info!(interval = ?p.config.poll_interval, "Starting message polling as live channel fallback");

    let shared = page.clone();
    let tick = Closure::wrap(Box::new(move || poll_once(&shared, id)) as Box<dyn FnMut()>);
    let period = millis(p.config.poll_interval);
    match p
        .window
        .set_interval_with_callback_and_timeout_and_arguments_0(tick.as_ref().unchecked_ref(), period)
    {
        Ok(handle) => {
            let cursor = PollCursor::new(p.config.table_id, p.config.poll_limit);
            p.poller = Some(PollRun { id, handle, cursor, _tick: tick });
        }
        Err(e) => error!(?e, "Failed to start polling"),
    }
}

fn poll_once(page: &SharedPage, run_id: u64) {
    let (api, query) = {
        let p = page.borrow();
        match p.poller.as_ref() {
            Some(run) if run.id == run_id => (p.api.clone(), run.cursor.query()),
            _ => return,
        }
    };
    let page = page.clone();
    spawn_local(async move {
        match api.fetch_messages(query).await {
            Ok(batch) => page.borrow_mut().accept_polled(run_id, batch),
            Err(e) => warn!(error = %e, "Polling error"),
        }
    });
}

fn load_history(page: &SharedPage) {
    let (api, query) = {
        let p = page.borrow();
        let query = MessagesQuery {
            limit: p.config.history_limit,
            table_id: p.config.table_id,
            after_id: None,
        };
        (p.api.clone(), query)
    };
    let page = page.clone();
    spawn_local(async move {
        match api.fetch_messages(query).await {
            Ok(messages) => {
                let mut p = page.borrow_mut();
                let count = messages.len();
                for msg in messages {
                    p.deliver(&InboundEvent::ChatMessage(msg));
                }
                p.sink.history_loaded(count);
            }
            Err(e) => warn!(error = %e, "Failed to load recent messages"),
        }
    });
}

fn refresh_presence(page: &SharedPage) {
    let api = page.borrow().api.clone();
    let page = page.clone();
    spawn_local(async move {
        match api.online_tables().await {
            Ok(tables) => {
                let mut p = page.borrow_mut();
                let presence = Presence::new(p.config.table_id, tables);
                p.sink.presence_changed(&presence);
            }
            Err(e) => warn!(error = %e, "Failed to load online tables"),
        }
    });
}

fn start_presence(page: &SharedPage) -> Result<(), JsValue> {
    refresh_presence(page);
    let shared = page.clone();
    let tick = Closure::wrap(Box::new(move || refresh_presence(&shared)) as Box<dyn FnMut()>);
    let p = page.borrow();
    p.window.set_interval_with_callback_and_timeout_and_arguments_0(
        tick.as_ref().unchecked_ref(),
        millis(p.config.presence_interval),
    )?;
    tick.forget();
    Ok(())
}

fn send_from_input(page: &SharedPage) {
    let p = page.borrow();
    let Some(input) = p.sink.input("message-input") else { return };
    let nickname = p.sink.input("nickname-input").map(|n| n.value());
    let Some(table_id) = p.config.table_id else { return };
    let Some(msg) =
        OutgoingMessage::compose(table_id, &input.value(), nickname.as_deref(), p.private_target)
    else {
        return;
    };

    let api = p.api.clone();
    let window = p.window.clone();
    let page = page.clone();
    spawn_local(async move {
        match api.send_message(&msg).await {
            Ok(()) => {
                input.set_value("");
                refresh_presence(&page);
            }
            Err(e) => {
                warn!(error = %e, "Failed to send message");
                let _ = window.alert_with_message(&format!("Failed to send message: {}", e));
            }
        }
    });
}

fn bind_input(page: &SharedPage) -> Result<(), JsValue> {
    let document = page.borrow().sink.document.clone();

    if let Some(button) = document.get_element_by_id("send-button") {
        let shared = page.clone();
        let on_click = Closure::wrap(Box::new(move |_: Event| send_from_input(&shared)) as Box<dyn Fn(Event)>);
        button.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())?;
        on_click.forget();
    }

    if let Some(input) = document.get_element_by_id("message-input") {
        let shared = page.clone();
        let on_key = Closure::wrap(Box::new(move |e: KeyboardEvent| {
            if e.key() == "Enter" {
                send_from_input(&shared);
            }
        }) as Box<dyn Fn(KeyboardEvent)>);
        input.add_event_listener_with_callback("keypress", on_key.as_ref().unchecked_ref())?;
        on_key.forget();
    }

    // Clicking a table in the online list starts a private chat with it
    if let Some(list) = document.get_element_by_id("online-users-list") {
        let shared = page.clone();
        let on_pick = Closure::wrap(Box::new(move |e: Event| {
            let picked = e
                .target()
                .and_then(|t| t.dyn_into::<Element>().ok())
                .and_then(|el| el.closest("[data-table-id]").ok().flatten());
            let Some(el) = picked else { return };
            let Some(table_id) = el.get_attribute("data-table-id").and_then(|t| t.parse().ok()) else {
                return;
            };
            let mut p = shared.borrow_mut();
            p.private_target = Some(table_id);
            p.sink.show_private_mode(Some(table_id));
        }) as Box<dyn Fn(Event)>);
        list.add_event_listener_with_callback("click", on_pick.as_ref().unchecked_ref())?;
        on_pick.forget();
    }

    if let Some(indicator) = document.get_element_by_id("private-mode-indicator") {
        let shared = page.clone();
        let on_exit = Closure::wrap(Box::new(move |_: Event| {
            let mut p = shared.borrow_mut();
            p.private_target = None;
            p.sink.show_private_mode(None);
        }) as Box<dyn Fn(Event)>);
        indicator.add_event_listener_with_callback("click", on_exit.as_ref().unchecked_ref())?;
        on_exit.forget();
    }
    Ok(())
}

fn bind_unload(page: &SharedPage) -> Result<(), JsValue> {
    let shared = page.clone();
    let on_unload = Closure::wrap(Box::new(move |_: Event| {
        handle(&shared, SupervisorEvent::Shutdown);
    }) as Box<dyn Fn(Event)>);
    page.borrow()
        .window
        .add_event_listener_with_callback("beforeunload", on_unload.as_ref().unchecked_ref())?;
    on_unload.forget();
    Ok(())
}

fn millis(d: Duration) -> i32 {
    i32::try_from(d.as_millis()).unwrap_or(i32::MAX)
}

// ============================================================================
// DOM sink
// ============================================================================

struct DomSink {
    document: Document,
    own_table: Option<TableId>,
    presence: Presence,
}

impl DomSink {
    fn new(document: Document, own_table: Option<TableId>) -> Self {
        Self {
            document,
            own_table,
            presence: Presence::new(own_table, Vec::new()),
        }
    }

    fn input(&self, id: &str) -> Option<HtmlInputElement> {
        self.document.get_element_by_id(id)?.dyn_into().ok()
    }

    fn append(&self, html: &str) {
        let Some(list) = self.document.get_element_by_id("chat-messages") else { return };
        if let Some(placeholder) = self.document.get_element_by_id("chat-empty") {
            placeholder.remove();
        }
        if let Err(e) = list.insert_adjacent_html("beforeend", html) {
            error!(?e, "Failed to render message");
        }
        list.set_scroll_top(list.scroll_height());
    }

    fn show_private_mode(&self, target: Option<TableId>) {
        let Some(el) = self.document.get_element_by_id("private-mode-indicator") else { return };
        match target {
            Some(table_id) => {
                let name = self.presence.nickname_of(table_id);
                el.set_text_content(Some(&format!("🔒 Private chat with {} (click to leave)", name)));
                let _ = el.remove_attribute("hidden");
            }
            None => {
                let _ = el.set_attribute("hidden", "");
            }
        }
    }
}

impl EventSink for DomSink {
    fn chat_message(&mut self, msg: &ChatMessage) {
        let view = MessageView::render(msg, self.own_table, &self.presence);
        let mut class = String::from("message");
        if view.mine {
            class.push_str(" mine");
        }
        if view.private {
            class.push_str(" private");
        }
        self.append(&format!(
            r#"<div class="{}"><div class="message-header">{}</div><div class="message-body">{}</div></div>"#,
            class,
            escape_html(&view.header),
            escape_html(&view.body)
        ));
    }

    fn gift_alert(&mut self, order: &GiftOrder) {
        if let Some(existing) = self.document.get_element_by_id("giftOrderAlert") {
            existing.remove();
        }
        let items: String = order
            .menu_items
            .iter()
            .map(|item| format!("<li>{}</li>", escape_html(item)))
            .collect();
        let note = order
            .message
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(|m| format!(r#"<p class="gift-note">"{}"</p>"#, escape_html(m)))
            .unwrap_or_default();
        let html = format!(
            r#"<div id="giftOrderAlert" class="gift-alert"><h5>🎁 A gift from {}!</h5><ul>{}</ul><p>{} won</p>{}</div>"#,
            escape_html(&order.from_nickname),
            items,
            format_amount(order.amount),
            note
        );
        match self.document.body() {
            Some(body) => {
                if let Err(e) = body.insert_adjacent_html("beforeend", &html) {
                    error!(?e, "Failed to show gift alert");
                }
            }
            None => warn!("No document body for gift alert"),
        }
    }

    fn system_message(&mut self, msg: &SystemMessage) {
        self.append(&format!(
            r#"<div class="system-message">{} <small>{}</small></div>"#,
            escape_html(&msg.message),
            escape_html(&msg.formatted_time)
        ));
    }

    fn status_changed(&mut self, status: ChannelStatus) {
        let Some(el) = self.document.get_element_by_id("chat-status") else { return };
        let Ok(el) = el.dyn_into::<HtmlElement>() else { return };
        el.set_text_content(Some(status.label()));
        let (r, g, b) = status.color_rgb();
        let style = el.style();
        let _ = style.set_property("background-color", &format!("rgb({}, {}, {})", r, g, b));
        let display = if status.indicator_visible() { "block" } else { "none" };
        let _ = style.set_property("display", display);
    }

    fn presence_changed(&mut self, presence: &Presence) {
        self.presence = presence.clone();
        if let Some(count) = self.document.get_element_by_id("online-count") {
            count.set_text_content(Some(&presence.total().to_string()));
        }
        let Some(list) = self.document.get_element_by_id("online-users-list") else { return };
        let html: String = presence
            .others()
            .map(|t| {
                format!(
                    r#"<li class="online-user" data-table-id="{}">{} <small>#{}</small></li>"#,
                    t.table_id,
                    escape_html(&t.display_name()),
                    t.table_id
                )
            })
            .collect();
        if html.is_empty() {
            list.set_inner_html(r#"<li class="online-empty">No other tables online</li>"#);
        } else {
            list.set_inner_html(&html);
        }
    }

    fn history_loaded(&mut self, count: usize) {
        if count == 0 {
            self.append_placeholder();
        }
    }
}

impl DomSink {
    fn append_placeholder(&self) {
        let Some(list) = self.document.get_element_by_id("chat-messages") else { return };
        let html = r#"<div id="chat-empty" class="system-message">No messages yet. Say hello!</div>"#;
        if let Err(e) = list.insert_adjacent_html("beforeend", html) {
            error!(?e, "Failed to render placeholder");
        }
    }
}
