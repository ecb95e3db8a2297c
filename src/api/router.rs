//! Route table and `:param` path matching (spec.md §4.11 step 4).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::NetPulseResult;

use super::http::{Method, Request, Response};

pub type HandlerFuture = Pin<Box<dyn Future<Output = NetPulseResult<Response>> + Send>>;
pub type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

pub struct Route {
    pub method: Method,
    pub pattern: &'static str,
    pub requires_auth: bool,
    pub handler: Handler,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn add<F, Fut>(&mut self, method: Method, pattern: &'static str, requires_auth: bool, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NetPulseResult<Response>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            pattern,
            requires_auth,
            handler: Arc::new(move |req| Box::pin(handler(req))),
        });
    }

    /// First route whose method matches and whose pattern has the same
    /// non-empty segment count as `path`, binding `:name` segments along
    /// the way (spec.md §4.11 step 4, Scenario S5).
    pub fn find(&self, method: Method, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            let pattern_segments: Vec<&str> = route.pattern.split('/').filter(|s| !s.is_empty()).collect();
            if pattern_segments.len() != path_segments.len() {
                continue;
            }
            let mut params = HashMap::new();
            let mut matched = true;
            for (pattern_seg, path_seg) in pattern_segments.iter().zip(path_segments.iter()) {
                if let Some(name) = pattern_seg.strip_prefix(':') {
                    params.insert(name.to_string(), path_seg.to_string());
                } else if pattern_seg != path_seg {
                    matched = false;
                    break;
                }
            }
            if matched {
                return Some((route, params));
            }
        }
        None
    }
}
