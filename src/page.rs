//! The single HTML page: chart targets, the visualization payload, the chat
//! form and the browser glue.
//!
//! The browser glue applies the same rules as [`crate::coordinator`]:
//! `htmx:wsBeforeMessage` is the gate, `htmx:wsAfterMessage` scrolls,
//! `htmx:wsAfterSend` resets the input, and socket close/error restore idle.

use html_escape::encode_double_quoted_attribute;

use crate::fragment::MESSAGE_LIST_ID;
use crate::viz::{script_safe, Theme, VisualizationSpecs};

/// WebSocket path the page connects to.
pub const WS_PATH: &str = "/ws/chat/";

const PAGE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en" data-theme="__THEME__">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Tandarunner</title>
<script src="https://unpkg.com/htmx.org@1.9.12"></script>
<script src="https://unpkg.com/htmx.org@1.9.12/dist/ext/ws.js"></script>
<script src="https://cdn.jsdelivr.net/npm/vega@5"></script>
<script src="https://cdn.jsdelivr.net/npm/vega-lite@5"></script>
<script src="https://cdn.jsdelivr.net/npm/vega-embed@6"></script>
<style>
  :root { --bg: #ffffff; --fg: #1f2328; --accent: #ff561b; --muted: #eaeef2; }
  [data-theme="dark"] { --bg: #0d1117; --fg: #e6edf3; --accent: #ff7a45; --muted: #161b22; }
  body { background: var(--bg); color: var(--fg); font-family: system-ui, sans-serif; margin: 0 auto; max-width: 60rem; padding: 1rem; }
  .chart { width: 100%; margin-bottom: 1.5rem; }
  #__LIST__ { max-height: 24rem; overflow-y: auto; display: flex; flex-direction: column; gap: .5rem; }
  .message { padding: .5rem .75rem; border-radius: .5rem; background: var(--muted); white-space: pre-wrap; }
  .message.user { align-self: flex-end; border: 1px solid var(--accent); }
  .notice { opacity: .7; }
  #messageinput { width: 100%; resize: none; overflow: hidden; box-sizing: border-box; }
  button:disabled, textarea:disabled { opacity: .5; }
</style>
</head>
<body>
<header>
  <h1>Tandarunner</h1>
  <button id="theme-toggle" type="button">Toggle theme</button>
</header>

<section id="charts">
__CHARTS__
</section>

<section id="chat" hx-ext="ws" ws-connect="__WS_PATH__">
  <div id="__LIST__"></div>
  <form id="chat-form" ws-send>
    <textarea id="messageinput" name="message" rows="1" placeholder="Ask about your training"></textarea>
    <button id="send-button" type="submit">Send</button>
    <button id="stop-button" type="button">Stop</button>
  </form>
</section>

<script id="visualizations" type="application/json">__VIZ_PAYLOAD__</script>
<script>
(function () {
  const MARKER = __MARKER__;
  const input = () => document.getElementById("messageinput");
  const list = () => document.getElementById("__LIST__");
  const sendButton = () => document.getElementById("send-button");

  // -- visualizations ------------------------------------------------------
  function renderCharts() {
    const specs = JSON.parse(document.getElementById("visualizations").textContent);
    const dark = document.documentElement.dataset.theme === "dark";
    Object.keys(specs).forEach(function (id) {
      vegaEmbed("#" + id, JSON.parse(specs[id]), {
        renderer: "svg",
        actions: false,
        theme: dark ? "dark" : "default",
      });
    });
  }

  document.addEventListener("DOMContentLoaded", function () {
    renderCharts();
    document.getElementById("theme-toggle").addEventListener("click", function () {
      const root = document.documentElement;
      root.dataset.theme = root.dataset.theme === "dark" ? "light" : "dark";
      renderCharts();
    });
    input().addEventListener("input", function () {
      const el = input();
      el.style.height = "auto";
      el.style.height = el.scrollHeight + "px";
    });
    input().addEventListener("keydown", function (e) {
      if (e.key === "Enter" && !e.shiftKey) {
        e.preventDefault();
        if (!sendButton().disabled) {
          htmx.trigger("#chat-form", "submit");
        }
      }
    });
    document.getElementById("stop-button").addEventListener("click", onStopRequested);
  });

  // -- generation coordinator ----------------------------------------------
  // phase: idle | submitted | generating | cancelling
  const state = { phase: "idle", socket: null };

  function setControls(enabled) {
    sendButton().disabled = !enabled;
    input().disabled = !enabled;
  }

  function finish() {
    state.phase = "idle";
    setControls(true);
    input().focus();
  }

  function isTerminal(html) {
    const t = document.createElement("template");
    t.innerHTML = html.trim();
    const root = t.content.firstElementChild;
    return !(root && root.hasAttribute(MARKER));
  }

  function onStopRequested() {
    if (state.phase !== "submitted" && state.phase !== "generating") return;
    state.phase = "cancelling";
    if (state.socket) state.socket.send(JSON.stringify({ action: "stop" }));
  }

  document.addEventListener("htmx:wsOpen", function (e) {
    state.socket = e.detail.socketWrapper;
  });

  document.addEventListener("htmx:wsConfigSend", function (e) {
    const text = (e.detail.parameters.message || "").trim();
    if (state.phase !== "idle" || text === "") {
      e.preventDefault();
      return;
    }
    state.phase = "submitted";
  });

  document.addEventListener("htmx:wsAfterSend", function () {
    const el = input();
    el.value = "";
    el.style.height = "auto";
    setControls(false);
  });

  document.addEventListener("htmx:wsBeforeMessage", function (e) {
    if (list().children.length === 0 && (state.phase === "idle" || state.phase === "submitted")) {
      return;
    }
    if (state.phase === "cancelling") {
      e.preventDefault();
    } else {
      state.phase = "generating";
    }
    setControls(false);
    if (isTerminal(e.detail.message)) {
      finish();
    }
  });

  document.addEventListener("htmx:wsAfterMessage", function () {
    const el = list();
    el.scrollTop = el.scrollHeight;
  });

  function onTransportFailed() {
    state.socket = null;
    if (state.phase !== "idle") finish();
  }
  document.addEventListener("htmx:wsClose", onTransportFailed);
  document.addEventListener("htmx:wsError", onTransportFailed);
})();
</script>
</body>
</html>
"##;

/// Render the page for the given charts, initial theme and marker attribute.
pub fn render_page(specs: &VisualizationSpecs, theme: Theme, marker: &str) -> String {
    let charts: String = specs
        .ids()
        .map(|id| format!("  <div class=\"chart\" id=\"{}\"></div>\n", encode_double_quoted_attribute(id)))
        .collect();
    let marker_js = script_safe(&serde_json::to_string(marker).unwrap_or_else(|_| "\"\"".to_string()));
    PAGE_TEMPLATE
        .replace("__THEME__", &theme.to_string())
        .replace("__CHARTS__", charts.trim_end())
        .replace("__WS_PATH__", WS_PATH)
        .replace("__LIST__", MESSAGE_LIST_ID)
        .replace("__MARKER__", &marker_js)
        .replace("__VIZ_PAYLOAD__", &specs.payload_json())
}
