//! Command executor - turns decoded commands into drone calls

use crate::context::RelayContext;
use crate::drone::DroneClient;
use drone_relay_shared::{now_ms, plan, CameraChannel, Command, DroneAction, FieldSet, PlannedAction};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of executing one command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Drone calls that succeeded
    pub applied: usize,
    /// Drone calls that returned an error
    pub failed: usize,
    /// Every call attempted, in order
    pub actions: Vec<DroneAction>,
    pub elapsed_ms: u64,
}

/// Executes commands against the shared drone client
pub struct CommandExecutor {
    drone: Arc<dyn DroneClient>,
    context: Arc<RelayContext>,
    fields: FieldSet,
}

impl CommandExecutor {
    /// Create a new command executor honoring only `fields`
    pub fn new(drone: Arc<dyn DroneClient>, context: Arc<RelayContext>, fields: FieldSet) -> Self {
        Self {
            drone,
            context,
            fields,
        }
    }

    pub fn drone(&self) -> &Arc<dyn DroneClient> {
        &self.drone
    }

    /// Apply every field of `command` in order
    ///
    /// A failing call is logged and does not stop the calls after it.
    pub async fn execute(&self, command: &Command) -> ExecutionReport {
        let start_time = now_ms();
        let mut report = ExecutionReport::default();

        for step in plan(command, self.fields) {
            let action = match step {
                PlannedAction::Drone(action) => action,
                PlannedAction::ToggleCamera => {
                    let camera = self.context.toggle_camera().await;
                    info!("Switching camera to {} ({})", camera, camera.id());
                    DroneAction::Config {
                        key: CameraChannel::CONFIG_KEY.into(),
                        value: camera.id().to_string(),
                    }
                }
            };

            debug!("[{}] {}", self.drone.name(), action);
            match self.drone.perform(&action).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    error!("Failed to {}: {:#}", action, e);
                    report.failed += 1;
                }
            }
            report.actions.push(action);
        }

        report.elapsed_ms = now_ms().saturating_sub(start_time);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drone::SimulatedDrone;
    use drone_relay_shared::CommandField;
    use serde_json::json;

    fn executor(fields: FieldSet) -> (CommandExecutor, Arc<SimulatedDrone>, Arc<RelayContext>) {
        let drone = Arc::new(SimulatedDrone::new());
        let context = Arc::new(RelayContext::new());
        let executor = CommandExecutor::new(drone.clone(), context.clone(), fields);
        (executor, drone, context)
    }

    fn command(value: serde_json::Value) -> Command {
        Command::from_json(&value)
    }

    #[tokio::test]
    async fn test_executes_in_field_order() {
        let (executor, drone, _) = executor(FieldSet::ALL);

        let report = executor
            .execute(&command(json!({"L": true, "R": -0.3, "X": 0.5, "T": true})))
            .await;

        assert_eq!(report.applied, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(
            drone.actions().await,
            vec![
                DroneAction::Right(0.5),
                DroneAction::CounterClockwise(0.3),
                DroneAction::Takeoff,
                DroneAction::Land,
            ]
        );
    }

    #[tokio::test]
    async fn test_camera_toggle_sends_new_channel_id() {
        let (executor, drone, context) = executor(FieldSet::ALL);

        executor.execute(&command(json!({"C": true}))).await;
        assert_eq!(context.camera().await, CameraChannel::Bottom);

        executor.execute(&command(json!({"C": true}))).await;
        assert_eq!(context.camera().await, CameraChannel::Front);

        let config = |value: &str| DroneAction::Config {
            key: "video:video_channel".into(),
            value: value.into(),
        };
        assert_eq!(drone.actions().await, vec![config("3"), config("0")]);
    }

    #[tokio::test]
    async fn test_failed_call_does_not_stop_the_rest() {
        let (executor, drone, _) = executor(FieldSet::ALL);
        drone.fail_on(DroneAction::Front(0.0)).await;

        let report = executor
            .execute(&command(json!({"X": 1, "Y": 1, "S": 1})))
            .await;

        assert_eq!(report.applied, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.actions.len(), 3);
        assert_eq!(
            drone.actions().await,
            vec![DroneAction::Right(1.0), DroneAction::Stop]
        );
    }

    #[tokio::test]
    async fn test_ignores_fields_outside_set() {
        let fields = FieldSet::of(&[CommandField::X, CommandField::Land]);
        let (executor, drone, context) = executor(fields);

        let report = executor
            .execute(&command(json!({"X": -0.2, "Z": 1, "C": true, "L": true})))
            .await;

        assert_eq!(report.applied, 2);
        assert_eq!(context.camera().await, CameraChannel::Front);
        assert_eq!(
            drone.actions().await,
            vec![DroneAction::Left(0.2), DroneAction::Land]
        );
    }

    #[tokio::test]
    async fn test_empty_command_does_nothing() {
        let (executor, drone, _) = executor(FieldSet::ALL);

        let report = executor.execute(&command(json!({"X": 0, "foo": 1}))).await;

        assert_eq!(report, ExecutionReport { elapsed_ms: report.elapsed_ms, ..Default::default() });
        assert!(drone.actions().await.is_empty());
    }
}
