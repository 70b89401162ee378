use std::sync::Arc;

use crate::config::Config;
use crate::introspect::IntrospectionView;
use crate::storage::MetricsSink;

#[derive(Clone)]
pub struct AppState {
    pub view: IntrospectionView,
    pub config: Arc<Config>,
    pub sink: Arc<dyn MetricsSink>,
}
