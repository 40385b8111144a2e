//! Models.
//!
//! [`KerasModel`] carries the operations every Keras model shares; it is
//! implemented by [`Sequential`] and by [`Model`], the untyped result of
//! [`load_model`] and [`model_from_json`].
//!
//! Methods that take a [`ParameterSet`] of extra options append it after
//! their own leading arguments, so the data argument always stays
//! positional:
//!
//! ```rust,ignore
//! let history = model.fit(&d, &x, &y, ParameterSet::new().with("epochs", 5).with("batch_size", 32))?;
//! ```

use super::callbacks::History;
use super::{HandleWrapper, NdArray, handle_wrapper};
use crate::backend::Backend;
use crate::dispatch::InvocationDispatcher;
use crate::error::{BridgeError, Result};
use crate::params::ParameterSet;
use crate::target::CallTarget;
use crate::value::{ForeignValue, FromForeign};

handle_wrapper! {
    /// A linear stack of layers.
    Sequential
}

handle_wrapper! {
    /// Any model, as returned by loading functions.
    Model
}

/// Operations shared by all models.
pub trait KerasModel: HandleWrapper {
    /// Configure training. The first entry of `params` (usually `optimizer`)
    /// is passed positionally.
    fn compile<B: Backend>(&self, d: &InvocationDispatcher<'_, B>, params: ParameterSet) -> Result<()> {
        d.invoke_static(&CallTarget::method_of(self.handle(), "compile"), &params)?;
        Ok(())
    }

    /// Train on `x` / `y` and return the training history.
    fn fit<B: Backend>(
        &self,
        d: &InvocationDispatcher<'_, B>,
        x: &NdArray,
        y: &NdArray,
        options: ParameterSet,
    ) -> Result<History> {
        let params = ParameterSet::new()
            .with("x", x.clone())
            .with("y", y.clone())
            .merge(options);
        d.invoke_constructor(&CallTarget::method_of(self.handle(), "fit"), &params)
            .map(History::from_handle)
    }

    /// Loss followed by each compiled metric.
    fn evaluate<B: Backend>(
        &self,
        d: &InvocationDispatcher<'_, B>,
        x: &NdArray,
        y: &NdArray,
        options: ParameterSet,
    ) -> Result<Vec<f64>> {
        let params = ParameterSet::new()
            .with("x", x.clone())
            .with("y", y.clone())
            .merge(options);
        let scores = d.invoke_static(&CallTarget::method_of(self.handle(), "evaluate"), &params)?;
        match scores {
            // A model compiled without metrics returns a bare loss.
            ForeignValue::Int(_) | ForeignValue::Float(_) => Ok(vec![f64::from_foreign(&scores)?]),
            other => Vec::<f64>::from_foreign(&other),
        }
    }

    fn predict<B: Backend>(
        &self,
        d: &InvocationDispatcher<'_, B>,
        x: &NdArray,
        options: ParameterSet,
    ) -> Result<NdArray> {
        let params = ParameterSet::new().with("x", x.clone()).merge(options);
        d.invoke_constructor(&CallTarget::method_of(self.handle(), "predict"), &params)
            .map(NdArray::from_handle)
    }

    /// The model architecture as a JSON string.
    fn to_json<B: Backend>(&self, d: &InvocationDispatcher<'_, B>) -> Result<String> {
        let json = d.invoke_static(&CallTarget::method_of(self.handle(), "to_json"), &ParameterSet::new())?;
        String::from_foreign(&json)
    }

    fn save_weights<B: Backend>(&self, d: &InvocationDispatcher<'_, B>, filepath: &str) -> Result<()> {
        let params = ParameterSet::new().with("filepath", filepath.to_string());
        d.invoke_static(&CallTarget::method_of(self.handle(), "save_weights"), &params)?;
        Ok(())
    }

    fn load_weights<B: Backend>(&self, d: &InvocationDispatcher<'_, B>, filepath: &str) -> Result<()> {
        let params = ParameterSet::new().with("filepath", filepath.to_string());
        d.invoke_static(&CallTarget::method_of(self.handle(), "load_weights"), &params)?;
        Ok(())
    }

    /// Print the summary table. The runtime writes it to its own stdout;
    /// read it back with [`LockToken::captured_stdout`](crate::LockToken::captured_stdout)
    /// when output capture is on.
    fn summary<B: Backend>(&self, d: &InvocationDispatcher<'_, B>) -> Result<()> {
        d.invoke_static(&CallTarget::method_of(self.handle(), "summary"), &ParameterSet::new())?;
        Ok(())
    }
}

impl KerasModel for Sequential {}
impl KerasModel for Model {}

impl Sequential {
    pub const PATH: &'static str = "models.Sequential";

    /// An empty model.
    pub fn new<B: Backend>(d: &InvocationDispatcher<'_, B>) -> Result<Self> {
        d.invoke_constructor(&CallTarget::module(Self::PATH), &ParameterSet::new())
            .map(Self::from_handle)
    }

    /// A model with `layers` added in order.
    pub fn with_layers<B, L>(d: &InvocationDispatcher<'_, B>, layers: &[L]) -> Result<Self>
    where
        B: Backend,
        L: HandleWrapper,
    {
        let model = Self::new(d)?;
        for layer in layers {
            model.add(d, layer)?;
        }
        Ok(model)
    }

    pub fn add<B: Backend>(&self, d: &InvocationDispatcher<'_, B>, layer: &impl HandleWrapper) -> Result<()> {
        let params = ParameterSet::new().with("layer", layer.handle().clone());
        d.invoke_static(&CallTarget::method_of(&self.handle, "add"), &params)?;
        Ok(())
    }
}

impl From<Sequential> for Model {
    fn from(model: Sequential) -> Self {
        Model::from_handle(model.handle)
    }
}

/// Load a model saved with `model.save`.
///
/// # Errors
///
/// The runtime's error when the file is missing or unreadable.
pub fn load_model<B: Backend>(d: &InvocationDispatcher<'_, B>, filepath: &str) -> Result<Model> {
    let params = ParameterSet::new().with("filepath", filepath.to_string());
    d.invoke_constructor(&CallTarget::module("models.load_model"), &params)
        .map(Model::from_handle)
}

/// Rebuild an (uncompiled, untrained) model from its JSON architecture.
pub fn model_from_json<B: Backend>(d: &InvocationDispatcher<'_, B>, json: &str) -> Result<Model> {
    if json.trim().is_empty() {
        return Err(BridgeError::conversion("model JSON", "empty string"));
    }
    let params = ParameterSet::new().with("json_string", json.to_string());
    d.invoke_constructor(&CallTarget::module("models.model_from_json"), &params)
        .map(Model::from_handle)
}
