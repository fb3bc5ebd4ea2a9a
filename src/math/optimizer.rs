// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Guiding traits to implement iterative optimization algorithms.

/// Enum used to indicate if iterations should continue or stop.
/// Must be returned by the `stop_criterion` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continue {
    /// Stop iterations.
    Stop,
    /// Continue iterations.
    Forward,
}

/// An `State<Observations, EvalState, Model>`
/// is capable of iteratively minimizing an energy function,
/// if provided few functions that are evaluated during iterations.
///
/// It is merely a skeleton for any iterative optimizer.
/// Here is a simple description of its generic types.
///
/// * `Observations`: the data used as reference during energy evaluations.
///   It is mutably borrowed so that evaluations can reuse scratch buffers.
/// * `EvalState`: result of the evaluation of a model.
///   It can short-circuit the computation of a full new state,
///   for example if we know that we are going to stop.
/// * `Model`: the model of what you are trying to optimize.
pub trait State<Observations, EvalState, Model>
where
    Self: std::marker::Sized,
{
    /// Initialize the optimizer state.
    fn init(obs: &mut Observations, model: Model) -> Self;

    /// Computes the next model from the current optimizer state.
    /// Returns `None` if no step can be computed (degenerate system),
    /// in which case iterations stop and the current state is kept.
    fn step(&self) -> Option<Model>;

    /// Evaluates the model.
    fn eval(&self, obs: &mut Observations, new_model: Model) -> EvalState;

    /// Function deciding if iterations should continue.
    /// Also returns the state that will be used for next iteration, or returned if we stop.
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue);

    /// Iteratively solve your optimization problem,
    /// with the provided functions by the trait implementation.
    /// Returns the final state and the number of iterations performed.
    fn iterative_solve(obs: &mut Observations, initial_model: Model) -> (Self, usize) {
        let mut state = Self::init(obs, initial_model);
        let mut nb_iter = 0;
        loop {
            let new_model = match state.step() {
                Some(model) => model,
                None => return (state, nb_iter),
            };
            nb_iter += 1;
            let eval_state = state.eval(obs, new_model);
            let (kept_state, continuation) = state.stop_criterion(nb_iter, eval_state);
            state = kept_state;
            if let Continue::Stop = continuation {
                return (state, nb_iter);
            }
        }
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    /// Newton iterations for the square root of `obs`.
    struct SqrtState {
        model: f64,
        residual: f64,
        step_size: f64,
    }

    impl State<f64, (f64, f64), f64> for SqrtState {
        fn init(obs: &mut f64, model: f64) -> Self {
            Self {
                model,
                residual: model * model - *obs,
                step_size: std::f64::INFINITY,
            }
        }

        fn step(&self) -> Option<f64> {
            if self.model == 0.0 {
                None
            } else {
                Some(self.model - self.residual / (2.0 * self.model))
            }
        }

        fn eval(&self, obs: &mut f64, new_model: f64) -> (f64, f64) {
            (new_model, new_model * new_model - *obs)
        }

        fn stop_criterion(self, nb_iter: usize, eval_state: (f64, f64)) -> (Self, Continue) {
            let (model, residual) = eval_state;
            let step_size = (model - self.model).abs();
            let continuation = if nb_iter >= 50 || step_size < 1e-12 {
                Continue::Stop
            } else {
                Continue::Forward
            };
            let state = Self {
                model,
                residual,
                step_size,
            };
            (state, continuation)
        }
    }

    #[test]
    fn newton_square_root() {
        let (state, nb_iter) = SqrtState::iterative_solve(&mut 2.0, 1.0);
        assert!((state.model - 2.0_f64.sqrt()).abs() < 1e-12);
        assert!(state.step_size < 1e-12);
        assert!(nb_iter < 10);
    }

    #[test]
    fn degenerate_step_keeps_initial_state() {
        let (state, nb_iter) = SqrtState::iterative_solve(&mut 2.0, 0.0);
        assert_eq!(nb_iter, 0);
        assert_eq!(state.model, 0.0);
    }
}
