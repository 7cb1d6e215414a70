pub mod builder;
pub mod command;
pub mod config;
pub mod measure;
pub mod model;
pub mod state;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use builder::BuilderService;
use command::{Command, Dispatcher};
use config::BuilderConfig;
use model::TableKey;
use state::{StateRegistry, Subscription};

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Schema builder handle for the canvas. Values cross the boundary as JSON.
#[wasm_bindgen]
pub struct SchemaBuilder {
    registry: StateRegistry,
    dispatcher: Dispatcher,
    subscriptions: Vec<Subscription>,
}

#[wasm_bindgen]
impl SchemaBuilder {
    #[wasm_bindgen(constructor)]
    pub fn new(config: Option<String>) -> Result<SchemaBuilder, String> {
        let config = match config.as_deref() {
            Some(json) => BuilderConfig::from_json(json).map_err(|e| e.to_string())?,
            None => BuilderConfig::default(),
        };
        let registry = StateRegistry::new();
        let service = BuilderService::from_registry(&registry, config);

        Ok(Self {
            dispatcher: Dispatcher::new(service),
            registry,
            subscriptions: Vec::new(),
        })
    }

    /// Queue a command and apply everything pending. Reports the first failure.
    pub fn dispatch(&mut self, command: &str) -> Result<(), String> {
        let command = Command::from_json(command).map_err(|e| e.to_string())?;
        self.dispatcher
            .sender()
            .send(command)
            .map_err(|e| e.to_string())?;

        let report = self.dispatcher.run_pending();
        match report.failed.first() {
            Some(err) => Err(err.to_string()),
            None => Ok(()),
        }
    }

    pub fn tables(&self) -> Result<String, String> {
        to_json(&self.registry.tables().take().unwrap_or_default())
    }

    pub fn relations(&self) -> Result<String, String> {
        to_json(&self.registry.relations().take().unwrap_or_default())
    }

    pub fn highlighted(&self) -> Result<String, String> {
        to_json(&self.registry.highlighted().take())
    }

    pub fn rename(&self) -> Result<String, String> {
        to_json(&self.registry.rename().take())
    }

    pub fn snapshot(&self) -> Result<String, String> {
        to_json(&self.registry.snapshot())
    }

    /// `[x, y, width, height]` of a committed table.
    #[wasm_bindgen(js_name = "tableBounds")]
    pub fn table_bounds(&self, name: &str, schema: &str) -> Option<Vec<f64>> {
        let key = TableKey::new(name, schema);
        let tables = self.registry.tables().take().unwrap_or_default();
        let table = tables.iter().find(|t| t.is(&key))?;
        let (width, height) = self.dispatcher.service().config().metrics.table_size(table);
        Some(vec![table.x, table.y, width, height])
    }

    #[wasm_bindgen(js_name = "onTables")]
    pub fn on_tables(&mut self, callback: js_sys::Function) {
        let sub = self.registry.tables().subscribe(forward(callback));
        self.subscriptions.push(sub);
    }

    #[wasm_bindgen(js_name = "onRelations")]
    pub fn on_relations(&mut self, callback: js_sys::Function) {
        let sub = self.registry.relations().subscribe(forward(callback));
        self.subscriptions.push(sub);
    }

    #[wasm_bindgen(js_name = "onHighlighted")]
    pub fn on_highlighted(&mut self, callback: js_sys::Function) {
        let sub = self.registry.highlighted().subscribe(forward(callback));
        self.subscriptions.push(sub);
    }

    #[wasm_bindgen(js_name = "onRename")]
    pub fn on_rename(&mut self, callback: js_sys::Function) {
        let sub = self.registry.rename().subscribe(forward(callback));
        self.subscriptions.push(sub);
    }

    #[wasm_bindgen(js_name = "clearSubscriptions")]
    pub fn clear_subscriptions(&mut self) {
        self.subscriptions.clear();
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console, js_name = error)]
    fn console_error(message: &JsValue);
}

fn forward<T: Serialize + 'static>(callback: js_sys::Function) -> impl Fn(&T) + 'static {
    move |value: &T| match serde_json::to_string(value) {
        Ok(json) => {
            if let Err(err) = callback.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                console_error(&err);
            }
        }
        Err(err) => console_error(&JsValue::from_str(&format!(
            "Failed to serialize state: {}",
            err
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_and_read_back() {
        let mut builder = SchemaBuilder::new(None).unwrap();
        builder.dispatch(r#"{"op":"add_table"}"#).unwrap();

        let tables = builder.tables().unwrap();
        assert!(tables.contains(r#""name":"untitled-1""#));
        assert!(builder.highlighted().unwrap().contains(r#""kind":"table""#));
        assert_eq!(builder.relations().unwrap(), "[]");
    }

    #[test]
    fn test_dispatch_reports_failure() {
        let mut builder = SchemaBuilder::new(None).unwrap();
        let err = builder
            .dispatch(r#"{"op":"rename_table","table":{"name":"x","schema":"dbo"},"new_name":"y"}"#)
            .unwrap_err();
        assert_eq!(err, "Table not found: dbo.x");
        assert!(builder.dispatch("not json").is_err());
    }

    #[test]
    fn test_config_is_applied() {
        let mut builder = SchemaBuilder::new(Some(r#"{"defaultSchema":"public"}"#.into())).unwrap();
        builder.dispatch(r#"{"op":"add_table"}"#).unwrap();
        assert!(builder.tables().unwrap().contains(r#""schema":"public""#));
        assert!(SchemaBuilder::new(Some("{".into())).is_err());
    }

    #[test]
    fn test_table_bounds() {
        let mut builder = SchemaBuilder::new(None).unwrap();
        builder
            .dispatch(r#"{"op":"add_table","position":{"x":30,"y":40}}"#)
            .unwrap();
        let bounds = builder.table_bounds("untitled-1", "dbo").unwrap();
        assert_eq!(bounds[0], 30.0);
        assert_eq!(bounds[1], 40.0);
        assert!(bounds[2] > 0.0);
        assert!(builder.table_bounds("missing", "dbo").is_none());
    }
}
