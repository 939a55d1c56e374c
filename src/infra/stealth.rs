//! Default identity generation and session init script.
//!
//! Identities are drawn from a small set of coherent desktop presets so the
//! user agent, platform, and WebGL strings never contradict each other. The
//! init script hides automation signatures and installs a pacing shim that
//! holds every outgoing `WebSocket.send` for a randomized delay.

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::config::PacingConfig;
use crate::core::collaborators::{Identity, IdentityProvider, Viewport};

struct Preset {
    user_agent: &'static str,
    platform: &'static str,
    webgl_vendor: &'static str,
    webgl_renderer: &'static str,
}

const PRESETS: &[Preset] = &[
    Preset {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "Win32",
        webgl_vendor: "Google Inc. (NVIDIA)",
        webgl_renderer: "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    Preset {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        platform: "Win32",
        webgl_vendor: "Google Inc. (Intel)",
        webgl_renderer: "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    Preset {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "MacIntel",
        webgl_vendor: "Google Inc. (Apple)",
        webgl_renderer: "ANGLE (Apple, Apple M1, OpenGL 4.1)",
    },
    Preset {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "Linux x86_64",
        webgl_vendor: "Google Inc. (AMD)",
        webgl_renderer: "ANGLE (AMD, AMD Radeon RX 6600 (radeonsi, navi23, LLVM 15.0.7), OpenGL 4.6)",
    },
];

const VIEWPORTS: &[Viewport] = &[
    Viewport { width: 1920, height: 1080 },
    Viewport { width: 1680, height: 1050 },
    Viewport { width: 1536, height: 864 },
    Viewport { width: 1440, height: 900 },
    Viewport { width: 1366, height: 768 },
];

const CORES: &[u32] = &[4, 6, 8, 12, 16];
const MEMORY_GB: &[u32] = &[4, 8, 16];

/// [`IdentityProvider`] built on fixed presets and the configured send pacing.
#[derive(Debug, Clone)]
pub struct DefaultIdentityProvider {
    pacing: PacingConfig,
    locale: String,
    timezone: String,
}

impl DefaultIdentityProvider {
    /// Provider with the given pacing; identities default to `en-US` / `Europe/Berlin`.
    #[must_use]
    pub fn new(pacing: PacingConfig) -> Self {
        Self {
            pacing,
            locale: "en-US".to_string(),
            timezone: "Europe/Berlin".to_string(),
        }
    }

    /// Override the locale and timezone stamped on generated identities.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>, timezone: impl Into<String>) -> Self {
        self.locale = locale.into();
        self.timezone = timezone.into();
        self
    }

    /// Pacing installed by [`IdentityProvider::create_init_script`].
    #[must_use]
    pub const fn pacing(&self) -> &PacingConfig {
        &self.pacing
    }
}

impl IdentityProvider for DefaultIdentityProvider {
    fn generate_identity(&self) -> Identity {
        let mut rng = rand::rng();
        let preset = PRESETS.choose(&mut rng).unwrap_or(&PRESETS[0]);
        let base = VIEWPORTS.choose(&mut rng).copied().unwrap_or(VIEWPORTS[0]);
        // Window chrome eats a few pixels; vary it so no two accounts match exactly.
        let viewport = Viewport {
            width: base.width,
            height: base.height - rng.random_range(60..=140),
        };
        Identity {
            user_agent: preset.user_agent.to_string(),
            viewport,
            hardware_concurrency: CORES.choose(&mut rng).copied().unwrap_or(8),
            device_memory_gb: MEMORY_GB.choose(&mut rng).copied().unwrap_or(8),
            platform: preset.platform.to_string(),
            locale: self.locale.clone(),
            timezone: self.timezone.clone(),
            webgl_vendor: preset.webgl_vendor.to_string(),
            webgl_renderer: preset.webgl_renderer.to_string(),
        }
    }

    fn create_init_script(&self, identity: &Identity) -> String {
        let p = &self.pacing;
        let language = identity.locale.split('-').next().unwrap_or("en");
        format!(
            r"(() => {{
  const define = (obj, key, value) =>
    Object.defineProperty(obj, key, {{ get: () => value, configurable: true }});
  define(Navigator.prototype, 'webdriver', undefined);
  define(Navigator.prototype, 'platform', {platform});
  define(Navigator.prototype, 'hardwareConcurrency', {cores});
  define(Navigator.prototype, 'deviceMemory', {memory});
  define(Navigator.prototype, 'languages', [{locale}, {language}]);
  if (!window.chrome) {{ window.chrome = {{ runtime: {{}} }}; }}

  const getParameter = WebGLRenderingContext.prototype.getParameter;
  WebGLRenderingContext.prototype.getParameter = function (param) {{
    if (param === 37445) return {vendor};
    if (param === 37446) return {renderer};
    return getParameter.call(this, param);
  }};

  const pacing = {{ min: {min}, max: {max}, thinkChance: {chance}, thinkMin: {tmin}, thinkMax: {tmax} }};
  const between = (lo, hi) => lo + Math.random() * (hi - lo);
  const nativeSend = WebSocket.prototype.send;
  const queues = new WeakMap();
  WebSocket.prototype.send = function (data) {{
    let q = queues.get(this);
    if (!q) {{ q = {{ items: [], busy: false }}; queues.set(this, q); }}
    q.items.push(data);
    if (q.busy) return;
    q.busy = true;
    const socket = this;
    const pump = () => {{
      if (q.items.length === 0 || socket.readyState > 1) {{ q.busy = false; return; }}
      const delay = Math.random() < pacing.thinkChance
        ? between(pacing.thinkMin, pacing.thinkMax)
        : between(pacing.min, pacing.max);
      setTimeout(() => {{
        if (socket.readyState === 1) nativeSend.call(socket, q.items.shift());
        pump();
      }}, delay);
    }};
    pump();
  }};
}})();",
            platform = js_string(&identity.platform),
            cores = identity.hardware_concurrency,
            memory = identity.device_memory_gb,
            locale = js_string(&identity.locale),
            language = js_string(language),
            vendor = js_string(&identity.webgl_vendor),
            renderer = js_string(&identity.webgl_renderer),
            min = p.min_delay_ms,
            max = p.max_delay_ms,
            chance = p.thinking_chance,
            tmin = p.thinking_min_ms,
            tmax = p.thinking_max_ms,
        )
    }
}

/// Quote a value as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
