//! Forward and inverse dynamics.

use approx::assert_relative_eq;
use mbs_conformance_tests::finite_diff::step_along_qdot;
use mbs_conformance_tests::joints::{Free, PinZ};
use mbs_conformance_tests::trees;
use mbs_core::{BodySpec, DynamicsConfig, MultibodyTree, SpatialVec, Stage};
use nalgebra::{DVector, Vector6};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Test: forward dynamics then inverse dynamics round trip.
///
/// Feeding the computed `udot` back with the same applied forces needs no
/// extra generalized force; without the applied generalized forces, the
/// inverse recovers them.
#[test]
fn forward_inverse_round_trip() {
    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(seed);
        let tree = trees::random_tree(&mut rng, 7, DynamicsConfig::default());
        let mut state = tree.make_state();
        trees::randomize(&mut rng, &tree, &mut state);
        trees::realize(&tree, &mut state, Stage::Dynamics);

        let tau = trees::random_vec(&mut rng, tree.nu());
        let forces = trees::random_body_forces(&mut rng, tree.num_bodies());
        let udot = tree
            .calc_tree_forward_dynamics(&state, &tau, &forces)
            .expect("forward");

        let residual = tree
            .calc_tree_inverse_dynamics(&state, udot.as_slice(), &tau, &forces)
            .expect("inverse");
        assert!(residual.norm() < 1e-8, "seed {seed}: residual {residual}");

        let zeros = vec![0.0; tree.nu()];
        let required = tree
            .calc_tree_inverse_dynamics(&state, udot.as_slice(), &zeros, &forces)
            .expect("inverse");
        assert_relative_eq!(required, DVector::from_vec(tau), epsilon = 1e-8);
    }
}

/// Test: joint forces `-Jᵀ F_gravity` hold a tree at rest in equilibrium.
#[test]
fn gravity_balanced_by_joint_forces_is_equilibrium() {
    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(40 + seed);
        let tree = trees::random_tree(&mut rng, 6, DynamicsConfig::default());
        let mut state = tree.make_state();
        trees::randomize(&mut rng, &tree, &mut state);
        state.u_mut().fill(0.0);
        trees::realize(&tree, &mut state, Stage::Dynamics);

        let gravity = tree.gravity_body_forces(&state).expect("gravity");
        let tau = -tree
            .calc_equivalent_joint_forces(&state, &gravity)
            .expect("Jᵀ F");

        let udot = tree
            .calc_tree_forward_dynamics(&state, tau.as_slice(), &gravity)
            .expect("forward");
        assert!(udot.norm() < 1e-9, "seed {seed}: udot = {udot}");

        // Same through the Acceleration stage, which adds gravity itself.
        state.dynamics_vars_mut().mobility_forces.copy_from(&tau);
        trees::realize(&tree, &mut state, Stage::Acceleration);
        assert!(state.udot().norm() < 1e-9, "seed {seed}: udot = {}", state.udot());
    }
}

/// Test: without gravity or body forces, `dKE/dt = u · tau`.
#[test]
fn power_balance() {
    const H: f64 = 1e-5;
    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(60 + seed);
        let tree = trees::random_tree(&mut rng, 5, DynamicsConfig::default().zero_gravity());
        let mut state = tree.make_state();
        trees::randomize(&mut rng, &tree, &mut state);
        let tau = DVector::from_vec(trees::random_vec(&mut rng, tree.nu()));
        state.dynamics_vars_mut().mobility_forces.copy_from(&tau);
        trees::realize(&tree, &mut state, Stage::Acceleration);

        let energy_at = |h: f64| {
            let mut moved = state.clone();
            moved.q_mut().copy_from_slice(&step_along_qdot(&state, h));
            let u = state.u() + state.udot() * h;
            moved.u_mut().copy_from(&u);
            trees::realize(&tree, &mut moved, Stage::Velocity);
            trees::kinetic_energy(&moved)
        };
        let rate = (energy_at(H) - energy_at(-H)) / (2.0 * H);
        let power = state.u().dot(&tau);
        assert!(
            (rate - power).abs() < 1e-6 * (1.0 + power.abs()),
            "seed {seed}: dKE/dt = {rate}, u·tau = {power}"
        );
    }
}

/// Test: a free body released from rest falls with gravity and does not spin.
#[test]
fn free_body_falls_with_gravity() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut tree = MultibodyTree::new(DynamicsConfig::default()).expect("config");
    tree.add_body(0, BodySpec::new(trees::random_mass(&mut rng)), Free)
        .expect("add");

    let mut state = tree.make_state();
    trees::realize(&tree, &mut state, Stage::Acceleration);

    let expected = Vector6::new(0.0, 0.0, 0.0, 0.0, 0.0, -9.81);
    assert_relative_eq!(
        Vector6::from_column_slice(state.udot().as_slice()),
        expected,
        epsilon = 1e-10
    );
    assert_relative_eq!(state.qdotdot()[6], -9.81, epsilon = 1e-10);
}

/// Test: with no bias and no gravity the net hinge force `D udot` equals the
/// applied joint torque on a single pin.
#[test]
fn net_hinge_force_on_single_pin() {
    let tree = trees::pin_chain(1, DynamicsConfig::default().zero_gravity());
    let mut state = tree.make_state();
    state.dynamics_vars_mut().mobility_forces[0] = 3.0;
    trees::realize(&tree, &mut state, Stage::Acceleration);

    let ac = state.acceleration_cache();
    assert_relative_eq!(ac.net_hinge_force[0], 3.0, epsilon = 1e-12);
    let d = state.dynamics_cache().d[0];
    assert_relative_eq!(state.udot()[0], 3.0 / d, epsilon = 1e-12);
}

/// Test: a link spinning steadily about a principal axis through its joint
/// needs no torque, and with no torque keeps its speed.
#[test]
fn steady_spin_needs_no_torque_on_single_pin() {
    let mut tree = MultibodyTree::new(DynamicsConfig::default()).expect("config");
    tree.add_body(0, BodySpec::new(trees::link(2.0, 1.0)), PinZ)
        .expect("add");
    let mut state = tree.make_state();
    state.u_mut()[0] = 4.0;
    trees::realize(&tree, &mut state, Stage::Dynamics);

    // Gravity along -z is parallel to the pin axis.
    let gravity = tree.gravity_body_forces(&state).expect("gravity");
    let tau = tree
        .calc_tree_inverse_dynamics(&state, &[0.0], &[0.0], &gravity)
        .expect("inverse");
    assert_relative_eq!(tau[0], 0.0, epsilon = 1e-12);

    let no_forces = vec![SpatialVec::zeros(); tree.num_bodies()];
    let udot = tree
        .calc_tree_forward_dynamics(&state, &[0.0], &no_forces)
        .expect("forward");
    assert_relative_eq!(udot[0], 0.0, epsilon = 1e-12);
}
