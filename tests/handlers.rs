use marginal_rs::handlers::{
    condition, config_enumerate, config_enumerate_with, current_plate_factory, enumerate, infer_config, seed,
    substitute, trace, with_enum_plates, InferConfig, Message,
};
use marginal_rs::random::PRNGKey;
use marginal_rs::{
    log_density, plate_to_enum_plate, Array, Bernoulli, Categorical, Context, EnumStrategy, Error, LogNormal,
    Normal, PlateFactory, Result,
};
use std::collections::HashMap;

fn latent_model(cx: &mut Context, _: &()) -> Result<()> {
    let z = cx.sample("z", Bernoulli::with_prob(0.4)?)?;
    cx.sample("w", LogNormal::new(Array::scalar(0.0), Array::scalar(1.0))?)?;
    cx.observe("y", Normal::new(z, Array::scalar(1.0))?, Array::scalar(0.5))?;
    Ok(())
}

fn enum_strategy(model_trace: &marginal_rs::Trace, name: &str) -> Option<EnumStrategy> {
    model_trace.get(name).and_then(|s| s.as_sample()).and_then(|s| s.infer.enumerate)
}

// =============================================================================
// ENUMERATED PLATE SCOPE
// =============================================================================

#[test]
fn test_scope_restored_after_normal_exit() {
    let seen = with_enum_plates(|| Ok(current_plate_factory())).unwrap();
    assert_eq!(seen, PlateFactory::Enumerated);
    assert_eq!(current_plate_factory(), PlateFactory::Independent);
}

#[test]
fn test_scope_restored_after_error() {
    let result: Result<()> = with_enum_plates(|| Err(Error::model("inside scope")));
    assert_eq!(result.unwrap_err(), Error::model("inside scope"));
    assert_eq!(current_plate_factory(), PlateFactory::Independent);
}

#[test]
fn test_scope_restored_after_panic() {
    let outcome = std::panic::catch_unwind(|| {
        let _scope = plate_to_enum_plate().unwrap();
        panic!("model blew up");
    });
    assert!(outcome.is_err());
    assert_eq!(current_plate_factory(), PlateFactory::Independent);
    assert!(plate_to_enum_plate().is_ok());
}

#[test]
fn test_plates_named_only_inside_scope() {
    let model = |cx: &mut Context, _: &()| -> Result<()> {
        cx.plate("rows", 3, |cx| {
            cx.observe("x", Normal::standard(), Array::vector(vec![0.0, 1.0, 2.0]))?;
            Ok(())
        })
    };
    let outside = trace(model).get_trace(&()).unwrap();
    let x = outside.get("x").and_then(|s| s.as_sample()).unwrap();
    assert!(x.infer.dim_to_name.is_empty());

    let inside = with_enum_plates(|| trace(model).get_trace(&())).unwrap();
    let x = inside.get("x").and_then(|s| s.as_sample()).unwrap();
    assert_eq!(x.infer.dim_to_name.get(&-1).map(String::as_str), Some("rows"));
    assert_eq!(x.cond_indep_stack[0].dim, Some(-1));
}

#[test]
fn test_scope_is_per_thread() {
    let _scope = plate_to_enum_plate().unwrap();
    let other = std::thread::spawn(current_plate_factory).join().unwrap();
    assert_eq!(other, PlateFactory::Independent);
    assert_eq!(current_plate_factory(), PlateFactory::Enumerated);
}

// =============================================================================
// ENUMERATION CONFIG
// =============================================================================

#[test]
fn test_config_enumerate_idempotent() {
    let once = trace(seed(config_enumerate(latent_model), PRNGKey::from_seed(3))).get_trace(&()).unwrap();
    let twice =
        trace(seed(config_enumerate(config_enumerate(latent_model)), PRNGKey::from_seed(3))).get_trace(&()).unwrap();
    for name in ["z", "w", "y"] {
        assert_eq!(enum_strategy(&once, name), enum_strategy(&twice, name));
    }
    assert_eq!(enum_strategy(&once, "z"), Some(EnumStrategy::Parallel));
}

#[test]
fn test_config_enumerate_keeps_existing_setting() {
    let model = config_enumerate_with(
        config_enumerate_with(latent_model, Some(EnumStrategy::Sequential)),
        Some(EnumStrategy::Parallel),
    );
    let tr = trace(seed(model, PRNGKey::from_seed(4))).get_trace(&()).unwrap();
    assert_eq!(enum_strategy(&tr, "z"), Some(EnumStrategy::Sequential));
}

#[test]
fn test_config_enumerate_default_none() {
    let tr = trace(seed(config_enumerate_with(latent_model, None), PRNGKey::from_seed(5))).get_trace(&()).unwrap();
    assert_eq!(enum_strategy(&tr, "z"), None);
}

#[test]
fn test_enumeration_on_continuous_site_is_ignored() {
    let force = |_: &Message, infer: &mut InferConfig| infer.enumerate = Some(EnumStrategy::Parallel);
    let model = seed(enumerate(infer_config(latent_model, force), -1), PRNGKey::from_seed(6));
    let tr = trace(model).get_trace(&()).unwrap();
    let w = tr.get("w").and_then(|s| s.as_sample()).unwrap();
    assert_eq!(w.infer.enumerate_dim, None);
    assert!(w.value.is_scalar());
    assert_eq!(w.intermediates.len(), 1);

    let z = tr.get("z").and_then(|s| s.as_sample()).unwrap();
    assert_eq!(z.infer.enumerate_dim, Some(-1));
}

#[test]
fn test_sequential_strategy_is_sampled() {
    let model = config_enumerate_with(latent_model, Some(EnumStrategy::Sequential));
    let tr = trace(seed(enumerate(model, -1), PRNGKey::from_seed(7))).get_trace(&()).unwrap();
    let z = tr.get("z").and_then(|s| s.as_sample()).unwrap();
    assert_eq!(z.infer.enumerate_dim, None);
    assert!(z.value.is_scalar());
}

#[test]
fn test_enumerate_skips_plate_dims() {
    let model = |cx: &mut Context, _: &()| -> Result<()> {
        cx.plate("outer", 2, |cx| {
            cx.sample("c", Categorical::new(Array::vector(vec![0.5, 0.25, 0.25]))?)?;
            Ok(())
        })
    };
    let tr = with_enum_plates(|| trace(enumerate(config_enumerate(model), -2)).get_trace(&())).unwrap();
    let c = tr.get("c").and_then(|s| s.as_sample()).unwrap();
    assert_eq!(c.infer.enumerate_dim, Some(-2));
    assert_eq!(c.value.shape().as_slice(), &[3, 1]);
    assert_eq!(c.log_prob().unwrap().shape().as_slice(), &[3, 2]);
}

// =============================================================================
// SUBSTITUTE, CONDITION, SEED
// =============================================================================

#[test]
fn test_substitute_does_not_observe() {
    let data = HashMap::from([("w".to_string(), Array::scalar(2.0))]);
    let tr = trace(seed(substitute(latent_model, data), PRNGKey::from_seed(8))).get_trace(&()).unwrap();
    let w = tr.get("w").and_then(|s| s.as_sample()).unwrap();
    assert_eq!(w.value.item(), Some(2.0));
    assert!(!w.is_observed);
}

#[test]
fn test_condition_turns_off_enumeration() {
    let data = HashMap::from([("z".to_string(), Array::scalar(1.0))]);
    let model = enumerate(config_enumerate(condition(latent_model, data)), -1);
    let tr = trace(seed(model, PRNGKey::from_seed(9))).get_trace(&()).unwrap();
    let z = tr.get("z").and_then(|s| s.as_sample()).unwrap();
    assert!(z.is_observed);
    assert_eq!(z.infer.enumerate, None);
    assert_eq!(z.value.item(), Some(1.0));
}

#[test]
fn test_seed_is_deterministic() {
    let draw = |seed_value: u64| {
        let tr = trace(seed(latent_model, PRNGKey::from_seed(seed_value))).get_trace(&()).unwrap();
        tr.get("w").unwrap().value().item().unwrap()
    };
    assert_eq!(draw(11), draw(11));
    assert_ne!(draw(11), draw(12));
}

#[test]
fn test_unseeded_latent_fails() {
    let err = trace(latent_model).get_trace(&()).unwrap_err();
    assert_eq!(err, Error::MissingRngKey("z".into()));
}

#[test]
fn test_duplicate_site_rejected() {
    let model = |cx: &mut Context, _: &()| -> Result<()> {
        cx.observe("x", Normal::standard(), Array::scalar(0.0))?;
        cx.observe("x", Normal::standard(), Array::scalar(1.0))?;
        Ok(())
    };
    let err = log_density(model, &(), &HashMap::new()).unwrap_err();
    assert_eq!(err, Error::DuplicateSite("x".into()));
    assert_eq!(current_plate_factory(), PlateFactory::Independent);
}
