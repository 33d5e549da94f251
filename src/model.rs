//! The model seam.
//!
//! The topology only needs the parameter sizes of the model it is bound to, for reporting.

/// Parameters whose name contains this marker are not counted by [`model_size`].
pub const AUXILIARY_MARKER: &str = "aux";

/// A model which can list its parameters.
pub trait Model {
    /// The name and the number of elements of every parameter.
    fn named_parameters(&self) -> Vec<(String, usize)>;
}

impl<M: Model + ?Sized> Model for &M {
    fn named_parameters(&self) -> Vec<(String, usize)> {
        (**self).named_parameters()
    }
}

/// The number of parameter elements of `model` in millions, auxiliary parameters excluded.
pub fn model_size(model: &(impl Model + ?Sized)) -> f64 {
    let elements: usize = model
        .named_parameters()
        .into_iter()
        .filter(|(name, _)| !name.contains(AUXILIARY_MARKER))
        .map(|(_, elements)| elements)
        .sum();
    elements as f64 / 1e6
}

/// A model described by a fixed list of parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterList(pub Vec<(String, usize)>);

impl Model for ParameterList {
    fn named_parameters(&self) -> Vec<(String, usize)> {
        self.0.clone()
    }
}

impl<S: Into<String>> std::iter::FromIterator<(S, usize)> for ParameterList {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, elements)| (name.into(), elements))
                .collect(),
        )
    }
}
