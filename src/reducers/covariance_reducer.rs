use crate::config::CovarianceParams;
use crate::core::error::ReducerError;
use crate::core::layout::EventNdims;
use crate::core::nested::Nested;
use crate::core::running_covariance::{Moment, RunningCovariance};
use crate::reducers::{Observation, Reducer, ReducerState};
use ndarray::ArrayD;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::{debug, trace};

/// Maps an observation (or the template) before it is accumulated.
pub type ObservationTransform = Arc<dyn Fn(&Observation) -> Observation + Send + Sync>;

/// Running covariance over the event dimensions of every leaf.
///
/// For a leaf of shape `batch_shape + event_shape`, the finalized result has
/// shape `batch_shape + event_shape + event_shape`; batch entries never
/// interact. By default the whole leaf is one event
/// ([`EventNdims::All`]).
#[derive(Clone)]
pub struct CovarianceReducer {
    name: String,
    event_ndims: EventNdims,
    ddof: usize,
    moment: Moment,
    transform: Option<ObservationTransform>,
}

impl Default for CovarianceReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for CovarianceReducer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CovarianceReducer")
            .field("name", &self.name)
            .field("event_ndims", &self.event_ndims)
            .field("ddof", &self.ddof)
            .field("moment", &self.moment)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl CovarianceReducer {
    pub fn new() -> Self {
        Self {
            name: "covariance_reducer".to_string(),
            event_ndims: EventNdims::All,
            ddof: 0,
            moment: Moment::Covariance,
            transform: None,
        }
    }

    pub fn with_event_ndims<E: Into<EventNdims>>(mut self, event_ndims: E) -> Self {
        self.event_ndims = event_ndims.into();
        self
    }

    pub fn with_ddof(mut self, ddof: usize) -> Self {
        self.ddof = ddof;
        self
    }

    pub fn with_name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Applies `transform` to the template in `initialize` and to every
    /// observation in `one_step`. It must keep the tree shape and leaf shapes
    /// consistent between the two.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Observation) -> Observation + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub(crate) fn with_moment(mut self, moment: Moment) -> Self {
        self.moment = moment;
        self
    }

    pub fn event_ndims(&self) -> EventNdims {
        self.event_ndims
    }

    pub fn ddof(&self) -> usize {
        self.ddof
    }

    pub fn moment(&self) -> Moment {
        self.moment
    }

    pub fn parameters(&self) -> CovarianceParams {
        CovarianceParams {
            event_ndims: self.event_ndims.as_option(),
            ddof: self.ddof,
        }
    }

    fn transformed<'a>(&self, observation: &'a Observation) -> Cow<'a, Observation> {
        match &self.transform {
            Some(f) => Cow::Owned(f(observation)),
            None => Cow::Borrowed(observation),
        }
    }
}

impl Reducer for CovarianceReducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, template: &Observation) -> Result<ReducerState, ReducerError> {
        let template = self.transformed(template);
        let running = template.try_map(|_, leaf| {
            RunningCovariance::from_shape(leaf.shape(), self.event_ndims, self.moment)
        })?;
        debug!(
            reducer = %self.name,
            leaves = running.num_leaves(),
            event_ndims = ?self.event_ndims,
            moment = ?self.moment,
            "initialized reducer state"
        );
        Ok(ReducerState::new(running))
    }

    fn one_step(
        &self,
        observation: &Observation,
        state: &ReducerState,
        axis: Option<usize>,
    ) -> Result<ReducerState, ReducerError> {
        let observation = self.transformed(observation);
        let running = state
            .running()
            .try_zip_with(observation.as_ref(), |_, acc, x| match axis {
                None => acc.update(x),
                Some(axis) => acc.update_chunk(x, axis),
            })?;
        trace!(
            reducer = %self.name,
            ?axis,
            num_samples = ?running.leaves().first().map(|acc| acc.num_samples()),
            "absorbed observation"
        );
        Ok(ReducerState::new(running))
    }

    fn finalize(&self, state: &ReducerState) -> Nested<ArrayD<f64>> {
        state.running().map(|acc| {
            if acc.num_samples() <= self.ddof as f64 {
                debug!(
                    reducer = %self.name,
                    num_samples = acc.num_samples(),
                    ddof = self.ddof,
                    "finalizing with num_samples <= ddof; result is not finite"
                );
            }
            acc.finalize(self.ddof)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::nested::NestedPath;
    use crate::testing::{chain_state, constant, stack};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{Array, IxDyn, arr0};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn scalar(v: f64) -> Observation {
        Nested::leaf(arr0(v).into_dyn())
    }

    fn random_samples(seed: u64, n: usize, shape: &[usize]) -> Vec<ArrayD<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Array::from_shape_fn(IxDyn(shape), |_| rng.random_range(-3.0..5.0)))
            .collect()
    }

    #[test]
    fn constant_zero_scalar_has_zero_covariance() {
        let reducer = CovarianceReducer::new();
        let mut state = reducer.initialize(&scalar(0.0)).unwrap();
        for _ in 0..2 {
            state = reducer.one_step(&scalar(0.0), &state, None).unwrap();
        }

        assert_eq!(state.num_samples(), Nested::leaf(2.0));
        assert_eq!(state.mean(), scalar(0.0));
        assert_eq!(reducer.finalize(&state), scalar(0.0));
    }

    #[test]
    fn matches_closed_form_population_statistics() {
        let mut rng = StdRng::seed_from_u64(42);
        let xs: Vec<f64> = (0..100).map(|_| rng.random::<f64>()).collect();

        let reducer = CovarianceReducer::new();
        let mut state = reducer.initialize(&scalar(0.0)).unwrap();
        for &x in &xs {
            state = reducer.one_step(&scalar(x), &state, None).unwrap();
        }

        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let got_mean = state.mean().into_leaf().unwrap()[IxDyn(&[])];
        let got_var = reducer.finalize(&state).into_leaf().unwrap()[IxDyn(&[])];
        assert_relative_eq!(got_mean, mean, max_relative = 1e-6);
        assert_relative_eq!(got_var, var, max_relative = 1e-6);
    }

    #[test]
    fn chunked_updates_produce_covariance_shape() {
        let reducer = CovarianceReducer::new().with_event_ndims(1);
        let mut state = reducer.initialize(&Nested::leaf(constant(&[9, 3], 1.0))).unwrap();
        for _ in 0..2 {
            state = reducer
                .one_step(&Nested::leaf(constant(&[5, 9, 3], 0.0)), &state, Some(0))
                .unwrap();
        }

        assert_eq!(state.num_samples(), Nested::leaf(10.0));
        assert_eq!(state.mean().into_leaf().unwrap().shape(), &[9, 3]);
        assert_eq!(reducer.finalize(&state).into_leaf().unwrap().shape(), &[9, 3, 3]);
    }

    #[test]
    fn whole_leaf_event_covariance_is_zero_for_constant_input() {
        let reducer = CovarianceReducer::new();
        let ones = Nested::leaf(constant(&[2, 3], 1.0));
        let mut state = reducer.initialize(&ones).unwrap();
        for _ in 0..100 {
            state = reducer.one_step(&ones, &state, None).unwrap();
        }
        let cov = reducer.finalize(&state).into_leaf().unwrap();
        assert_abs_diff_eq!(cov, constant(&[2, 3, 2, 3], 0.0), epsilon = 1e-6);
    }

    #[test]
    fn configuration_is_fixed_across_steps() {
        let reducer = CovarianceReducer::new().with_event_ndims(1).with_ddof(1);
        let mut state = reducer.initialize(&Nested::leaf(constant(&[2, 3], 1.0))).unwrap();
        assert_eq!(reducer.event_ndims(), EventNdims::Trailing(1));
        assert_eq!(reducer.ddof(), 1);

        for _ in 0..2 {
            state = reducer
                .one_step(&Nested::leaf(constant(&[2, 3], 0.0)), &state, None)
                .unwrap();
        }
        assert_eq!(reducer.event_ndims(), EventNdims::Trailing(1));
        assert_eq!(reducer.ddof(), 1);
        assert_eq!(reducer.name(), "covariance_reducer");
        assert_eq!(reducer.moment(), Moment::Covariance);
    }

    #[test]
    fn nested_state_keeps_structure() {
        let reducer = CovarianceReducer::new().with_event_ndims(0);
        let chain = chain_state(&[2, 3]);
        let mut state = reducer.initialize(&chain).unwrap();
        for _ in 0..10 {
            state = reducer.one_step(&chain, &state, None).unwrap();
        }

        let zeros = constant(&[2, 3], 0.0);
        let expected = Nested::sequence([
            Nested::mapping([("one", Nested::leaf(zeros.clone())), ("zero", Nested::leaf(zeros.clone()))]),
            Nested::mapping([("two", Nested::leaf(zeros))]),
        ]);
        assert_eq!(reducer.finalize(&state), expected);
    }

    #[test]
    fn nested_state_with_batching_and_chunking() {
        let reducer = CovarianceReducer::new().with_event_ndims(1);
        let chain = chain_state(&[3, 4]);
        let chunk = chain.map(|leaf| stack(&[leaf.clone(), leaf.clone()], 0).unwrap());
        let mut state = reducer.initialize(&chain).unwrap();
        for _ in 0..10 {
            state = reducer.one_step(&chunk, &state, Some(0)).unwrap();
        }

        let zeros = constant(&[3, 4, 4], 0.0);
        let expected = Nested::sequence([
            Nested::mapping([("one", Nested::leaf(zeros.clone())), ("zero", Nested::leaf(zeros.clone()))]),
            Nested::mapping([("two", Nested::leaf(zeros))]),
        ]);
        assert_eq!(reducer.finalize(&state), expected);
        assert!(state.num_samples().leaves().iter().all(|&&n| n == 20.0));
    }

    #[test]
    fn result_is_independent_of_chunking_and_order() {
        let reducer = CovarianceReducer::new().with_event_ndims(1).with_ddof(1);
        let samples = random_samples(7, 12, &[2, 3]);
        let template = Nested::leaf(constant(&[2, 3], 0.0));
        let init = reducer.initialize(&template).unwrap();

        let one_at_a_time = samples.iter().fold(init.clone(), |state, x| {
            reducer.one_step(&Nested::leaf(x.clone()), &state, None).unwrap()
        });

        let whole = Nested::leaf(stack(&samples, 0).unwrap());
        let single_chunk = reducer.one_step(&whole, &init, Some(0)).unwrap();

        let head = Nested::leaf(stack(&samples[..5], 0).unwrap());
        let tail = Nested::leaf(stack(&samples[5..], 0).unwrap());
        let two_chunks = reducer.one_step(&head, &init, Some(0)).unwrap();
        let two_chunks = reducer.one_step(&tail, &two_chunks, Some(0)).unwrap();
        let reversed = reducer.one_step(&tail, &init, Some(0)).unwrap();
        let reversed = reducer.one_step(&head, &reversed, Some(0)).unwrap();

        let expected = reducer.finalize(&one_at_a_time).into_leaf().unwrap();
        for state in [&single_chunk, &two_chunks, &reversed] {
            let got = reducer.finalize(state).into_leaf().unwrap();
            assert_eq!(got.shape(), &[2, 3, 3]);
            assert_abs_diff_eq!(got, expected, epsilon = 1e-10);
            assert_eq!(state.num_samples(), Nested::leaf(12.0));
        }
    }

    #[test]
    fn finalize_is_idempotent_and_does_not_disturb_the_stream() {
        let reducer = CovarianceReducer::new().with_event_ndims(1);
        let samples = random_samples(11, 6, &[4]);
        let mut with_peeks = reducer.initialize(&Nested::leaf(constant(&[4], 0.0))).unwrap();
        let mut without = with_peeks.clone();

        for x in &samples {
            let x = Nested::leaf(x.clone());
            with_peeks = reducer.one_step(&x, &with_peeks, None).unwrap();
            let first = reducer.finalize(&with_peeks);
            let second = reducer.finalize(&with_peeks);
            assert_eq!(first, second);

            without = reducer.one_step(&x, &without, None).unwrap();
        }
        assert_eq!(with_peeks, without);
    }

    #[test]
    fn one_step_does_not_mutate_its_input_state() {
        let reducer = CovarianceReducer::new();
        let start = reducer.initialize(&scalar(0.0)).unwrap();
        let left = reducer.one_step(&scalar(1.0), &start, None).unwrap();
        let right = reducer.one_step(&scalar(-1.0), &start, None).unwrap();

        assert_eq!(start.num_samples(), Nested::leaf(0.0));
        assert_eq!(left.mean(), scalar(1.0));
        assert_eq!(right.mean(), scalar(-1.0));
    }

    #[test]
    fn mismatched_structure_is_rejected() {
        let reducer = CovarianceReducer::new();
        let chain = chain_state(&[2]);
        let state = reducer.initialize(&chain).unwrap();

        let err = reducer.one_step(&scalar(1.0), &state, None).unwrap_err();
        assert!(matches!(err, ReducerError::StructureMismatch { .. }));
    }

    #[test]
    fn leaf_shape_errors_point_at_the_leaf() {
        let reducer = CovarianceReducer::new().with_event_ndims(1);
        let chain = chain_state(&[3, 4]);
        let state = reducer.initialize(&chain).unwrap();

        let bad_axis = chain.map(|leaf| stack(&[leaf.clone()], 0).unwrap());
        let err = reducer.one_step(&bad_axis, &state, Some(2)).unwrap_err();
        match err {
            ReducerError::Shape { path, .. } => assert_ne!(path, NestedPath::root()),
            other => panic!("unexpected error: {other}"),
        }

        let err = reducer
            .initialize(&Nested::leaf(arr0(1.0).into_dyn()))
            .unwrap_err();
        assert!(matches!(err, ReducerError::Shape { .. }));
    }

    #[test]
    fn transform_is_applied_to_template_and_observations() {
        let reducer = CovarianceReducer::new()
            .with_event_ndims(0)
            .with_transform(|obs: &Observation| obs.map(|leaf| leaf * 2.0));
        let mut state = reducer.initialize(&scalar(0.0)).unwrap();
        for v in [1.0, 3.0] {
            state = reducer.one_step(&scalar(v), &state, None).unwrap();
        }
        assert_eq!(state.mean(), scalar(4.0));
        assert_eq!(reducer.finalize(&state), scalar(4.0));
    }

    #[test]
    fn state_survives_a_serde_checkpoint() {
        let reducer = CovarianceReducer::new().with_event_ndims(1);
        let samples = random_samples(3, 8, &[2, 2]);
        let mut state = reducer.initialize(&chain_state(&[2, 2])).unwrap();
        for x in &samples[..4] {
            state = reducer.one_step(&chain_state(&[2, 2]).map(|leaf| leaf + x), &state, None).unwrap();
        }

        let json = serde_json::to_string(&state).unwrap();
        let mut restored: ReducerState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.num_samples(), state.num_samples());

        for x in &samples[4..] {
            let obs = chain_state(&[2, 2]).map(|leaf| leaf + x);
            state = reducer.one_step(&obs, &state, None).unwrap();
            restored = reducer.one_step(&obs, &restored, None).unwrap();
        }
        let restored = reducer.finalize(&restored);
        let state = reducer.finalize(&state);
        for (a, b) in restored.leaves().into_iter().zip(state.leaves()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn parameters_round_trip_through_config() {
        let reducer = CovarianceReducer::new().with_event_ndims(2).with_ddof(1);
        let rebuilt = CovarianceReducer::from(reducer.parameters());
        assert_eq!(rebuilt.event_ndims(), reducer.event_ndims());
        assert_eq!(rebuilt.ddof(), reducer.ddof());
    }
}
