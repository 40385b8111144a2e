//! Training callbacks and history.

use super::{HandleWrapper, handle_wrapper};
use crate::backend::Backend;
use crate::dispatch::InvocationDispatcher;
use crate::error::Result;
use crate::params::ParameterSet;
use crate::target::CallTarget;
use crate::value::FromForeign;

handle_wrapper! {
    /// Stops training once a monitored quantity stops improving.
    EarlyStopping
}

handle_wrapper! {
    /// The object `fit` returns.
    History
}

impl EarlyStopping {
    pub const PATH: &'static str = "callbacks.EarlyStopping";

    /// Monitor `monitor` with the runtime's default patience.
    pub fn new<B: Backend>(d: &InvocationDispatcher<'_, B>, monitor: &str) -> Result<Self> {
        Self::build(d, ParameterSet::new().with("monitor", monitor.to_string()))
    }

    /// Build from a full parameter set, `monitor` first.
    pub fn build<B: Backend>(d: &InvocationDispatcher<'_, B>, params: ParameterSet) -> Result<Self> {
        d.invoke_constructor(&CallTarget::module(Self::PATH), &params)
            .map(Self::from_handle)
    }
}

impl History {
    /// Indices of the epochs that ran.
    pub fn epochs<B: Backend>(&self, d: &InvocationDispatcher<'_, B>) -> Result<Vec<i64>> {
        let epochs = d.get_attribute(&CallTarget::on(&self.handle, "epoch"))?;
        Vec::<i64>::from_foreign(&epochs)
    }

    /// Per-epoch values of `name` (`"loss"`, `"val_accuracy"`, ...), or
    /// `None` if training did not record it.
    pub fn metric<B: Backend>(&self, d: &InvocationDispatcher<'_, B>, name: &str) -> Result<Option<Vec<f64>>> {
        let values = d.invoke_static(
            &CallTarget::on(&self.handle, "history").method("get"),
            &ParameterSet::new().with("key", name.to_string()),
        )?;
        Option::<Vec<f64>>::from_foreign(&values)
    }

    /// Value of `name` after the final epoch.
    pub fn last<B: Backend>(&self, d: &InvocationDispatcher<'_, B>, name: &str) -> Result<Option<f64>> {
        Ok(self.metric(d, name)?.and_then(|values| values.last().copied()))
    }
}
