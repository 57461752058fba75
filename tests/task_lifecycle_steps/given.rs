//! Given steps for task lifecycle BDD scenarios.

use super::world::{TaskLifecycleWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use taskflow::task::{domain::CreateTaskRequest, services::TaskMutator};

#[given(r#"a pending task titled "{title}""#)]
fn pending_task(world: &mut TaskLifecycleWorld, title: String) -> Result<(), eyre::Report> {
    let task = run_async(
        world
            .app
            .commands
            .create(CreateTaskRequest::new(title, "user-1")),
    )
    .wrap_err("create task in scenario setup")?;
    // Creation jobs are not under test here.
    run_async(world.app.worker.drain()).wrap_err("settle creation job")?;
    world.task = Some(task);
    Ok(())
}
