//! Assembly sequencing: bundle → environment → commit → injector.

use std::sync::Arc;

use monkey::prelude::*;
use monkey_core::di::InjectionError;
use monkey_core::StateError;

#[derive(Debug, PartialEq)]
struct Foo {
    greeting: String,
}

struct Repository;

struct Service {
    repository: Inject<Repository>,
}

impl Injectable for Service {
    fn inject(injector: &Injector) -> Result<Self, InjectionError> {
        Ok(Self {
            repository: Inject::resolve(injector)?,
        })
    }
}

struct FooBundle;

impl Bundle for FooBundle {
    fn name(&self) -> &str {
        "foo"
    }

    fn run(&self, environment: &mut Environment) -> anyhow::Result<()> {
        environment.modules().register_module(|binder: &mut Binder| {
            binder.bind_singleton(|_injector: &Injector| {
                Ok(Foo {
                    greeting: "hello".to_string(),
                })
            });
        })?;
        Ok(())
    }
}

struct EmptyApp;

impl Application<BaseConfig> for EmptyApp {
    fn name(&self) -> &str {
        "empty"
    }

    fn run(
        &self,
        _configuration: &BaseConfig,
        environment: &mut Environment,
    ) -> anyhow::Result<()> {
        assert_eq!(environment.injector().unwrap_err(), StateError::NotCommitted);
        Ok(())
    }
}

#[test]
fn test_bundle_module_resolves_after_commit() {
    let mut bootstrap = Bootstrap::with_mode(EmptyApp, Mode::Test);
    bootstrap.add_bundle(FooBundle).unwrap();

    let mut environment = bootstrap.create_environment();
    bootstrap
        .run_bundles(&BaseConfig::default(), &mut environment)
        .unwrap();

    assert_eq!(environment.injector().unwrap_err(), StateError::NotCommitted);

    environment.commit().unwrap();
    let foo = environment.injector().unwrap().get::<Foo>().unwrap();
    assert_eq!(
        *foo,
        Foo {
            greeting: "hello".to_string()
        }
    );
}

#[test]
fn test_prepare_then_commit_in_production() {
    let mut bootstrap = Bootstrap::with_mode(EmptyApp, Mode::Prod);
    bootstrap.add_bundle(FooBundle).unwrap();

    let mut environment = bootstrap.prepare(&BaseConfig::default()).unwrap();
    environment
        .modules()
        .register_instance(Arc::new(Repository))
        .unwrap()
        .register_type::<Service>()
        .unwrap();

    let injector = environment.commit().unwrap();
    assert_eq!(injector.stage(), Stage::Production);

    let service = injector.get::<Service>().unwrap();
    assert!(Arc::ptr_eq(
        &service.repository.shared(),
        &injector.get::<Repository>().unwrap()
    ));
}

#[test]
fn test_registration_after_commit_fails() {
    let bootstrap = Bootstrap::with_mode(EmptyApp, Mode::Test);
    let mut environment = bootstrap.prepare(&BaseConfig::default()).unwrap();
    environment.commit().unwrap();

    let err = environment
        .modules()
        .register_instance(Arc::new(Repository))
        .unwrap_err();
    assert!(matches!(err, StateError::AlreadyCommitted { .. }));

    let err = environment.commit().unwrap_err();
    assert!(matches!(err, monkey_core::di::DiError::State(_)));
}

#[test]
fn test_missing_dependency_fails_production_commit() {
    let bootstrap = Bootstrap::with_mode(EmptyApp, Mode::Prod);
    let mut environment = bootstrap.prepare(&BaseConfig::default()).unwrap();
    environment.modules().register_type::<Service>().unwrap();

    assert!(environment.commit().is_err());
    assert!(environment.injector().is_err());
}
