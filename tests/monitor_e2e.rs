use std::sync::{Arc, Mutex};
use std::time::Duration;

use varmon::factories::{enum_changed, enum_equals, lower_threshold, string_equals, upper_threshold, value_jump};
use varmon::{
    AlarmEvent, Classification, Condition, DelayedCondition, Direction, EnumValue, HysteresisCondition,
    ManualTimerProvider, MonitorEngine, SystemTimerProvider, TimerProvider, Value, ValueChangedEvent,
};

#[derive(Default)]
struct Recorder {
    triggered: Mutex<Vec<AlarmEvent>>,
    cleared: Mutex<Vec<AlarmEvent>>,
}

impl Recorder {
    fn attach(engine: &MonitorEngine) -> Arc<Self> {
        let rec = Arc::new(Self::default());
        let t = Arc::clone(&rec);
        engine
            .subscribe_triggered(move |ev| t.triggered.lock().unwrap().push(ev.clone()))
            .unwrap();
        let c = Arc::clone(&rec);
        engine
            .subscribe_cleared(move |ev| c.cleared.lock().unwrap().push(ev.clone()))
            .unwrap();
        rec
    }

    fn triggered(&self) -> Vec<AlarmEvent> {
        self.triggered.lock().unwrap().clone()
    }

    fn cleared(&self) -> Vec<AlarmEvent> {
        self.cleared.lock().unwrap().clone()
    }
}

fn manual_engine() -> (Arc<ManualTimerProvider>, MonitorEngine) {
    let clock = Arc::new(ManualTimerProvider::new());
    let engine = MonitorEngine::with_timer_provider(Arc::clone(&clock) as Arc<dyn TimerProvider>);
    (clock, engine)
}

fn delayed_overheat(delay_secs: u64) -> Condition {
    DelayedCondition::new(
        upper_threshold(85.0, Classification::Critical, "overheating"),
        Duration::from_secs(delay_secs),
    )
    .unwrap()
    .into()
}

#[test]
fn upper_threshold_is_strict() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    engine
        .register_variable("temp1", "Temperature", 50.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();

    engine.notify_value_changed("temp1", 80.0).unwrap();
    assert!(rec.triggered().is_empty());

    engine.notify_value_changed("temp1", 80.5).unwrap();
    let triggered = rec.triggered();
    assert_eq!(triggered.len(), 1);
    assert!(triggered[0].active);
    assert_eq!(triggered[0].variable_name, "Temperature");
    assert_eq!(triggered[0].direction(), Direction::UpperBound);
    assert_eq!(triggered[0].threshold_value, Some(Value::Float(80.0)));
    assert_eq!(triggered[0].previous_value, Some(Value::Float(80.0)));

    engine.notify_value_changed("temp1", 80.0).unwrap();
    let cleared = rec.cleared();
    assert_eq!(cleared.len(), 1);
    assert!(!cleared[0].active);
    assert_eq!(cleared[0].current_value, Value::Float(80.0));
}

#[test]
fn lower_threshold_is_strict() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    engine
        .register_variable("level", "Tank level", 50, vec![lower_threshold(10, Classification::Critical, "low").into()])
        .unwrap();

    engine.notify_value_changed("level", 10).unwrap();
    assert!(rec.triggered().is_empty());
    engine.notify_value_changed("level", 9).unwrap();
    assert_eq!(rec.triggered().len(), 1);
    assert_eq!(rec.triggered()[0].direction(), Direction::LowerBound);
}

#[test]
fn repeated_trigger_notifies_once() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    engine
        .register_variable("temp1", "T", 50.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();

    for v in [90.0, 95.0, 100.0, 99.0] {
        engine.notify_value_changed("temp1", v).unwrap();
    }
    assert_eq!(rec.triggered().len(), 1);
    assert_eq!(engine.get_active_alarms().unwrap().len(), 1);
}

#[test]
fn hysteresis_triggers_and_clears_once() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    let h = HysteresisCondition::new(Direction::UpperBound, 85.0, 75.0, Classification::Warning, "hot").unwrap();
    engine.register_variable("temp1", "T", 70.0, vec![h.into()]).unwrap();

    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert_eq!(rec.triggered().len(), 1);
    assert_eq!(rec.triggered()[0].current_value, Value::Float(90.0));
    assert_eq!(rec.triggered()[0].threshold_value, Some(Value::Float(85.0)));

    engine.notify_value_changed("temp1", 82.0).unwrap();
    assert_eq!(rec.triggered().len(), 1);
    assert!(rec.cleared().is_empty());

    engine.notify_value_changed("temp1", 74.0).unwrap();
    assert_eq!(rec.triggered().len(), 1);
    assert_eq!(rec.cleared().len(), 1);
    assert_eq!(rec.cleared()[0].current_value, Value::Float(74.0));
    assert!(engine.get_active_alarms().unwrap().is_empty());
}

#[test]
fn hysteresis_lower_bound() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    let h = HysteresisCondition::new(Direction::LowerBound, 10, 20, Classification::Error, "low").unwrap();
    engine.register_variable("p", "Pressure", 30, vec![h.into()]).unwrap();

    for v in [9, 2, 15, 19, 20, 12, 5] {
        engine.notify_value_changed("p", v).unwrap();
    }
    let triggered: Vec<Value> = rec.triggered().into_iter().map(|e| e.current_value).collect();
    let cleared: Vec<Value> = rec.cleared().into_iter().map(|e| e.current_value).collect();
    assert_eq!(triggered, vec![Value::Int(9), Value::Int(5)]);
    assert_eq!(cleared, vec![Value::Int(20)]);
}

#[test]
fn delayed_condition_fires_after_delay() {
    let (clock, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    engine.register_variable("temp1", "T", 70.0, vec![delayed_overheat(5)]).unwrap();

    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert!(rec.triggered().is_empty());

    clock.advance(Duration::from_millis(4_999));
    assert!(rec.triggered().is_empty());

    clock.advance(Duration::from_millis(1));
    let triggered = rec.triggered();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].classification(), Classification::Critical);
    assert_eq!(triggered[0].previous_value, None);
    assert_eq!(triggered[0].current_value, Value::Float(90.0));

    clock.advance(Duration::from_secs(30));
    engine.notify_value_changed("temp1", 91.0).unwrap();
    assert_eq!(rec.triggered().len(), 1);
}

#[test]
fn delayed_condition_spike_is_suppressed_and_restarts() {
    let (clock, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    engine.register_variable("temp1", "T", 70.0, vec![delayed_overheat(5)]).unwrap();

    engine.notify_value_changed("temp1", 90.0).unwrap();
    clock.advance(Duration::from_secs(3));
    engine.notify_value_changed("temp1", 80.0).unwrap();
    clock.advance(Duration::from_secs(10));
    assert!(rec.triggered().is_empty());
    assert!(rec.cleared().is_empty());

    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert_eq!(engine.delay_remaining("temp1", 0).unwrap(), Some(Duration::from_secs(5)));
    clock.advance(Duration::from_secs(4));
    assert!(rec.triggered().is_empty());
    clock.advance(Duration::from_secs(1));
    assert_eq!(rec.triggered().len(), 1);
}

#[test]
fn delayed_alarm_clears_immediately() {
    let (clock, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    engine.register_variable("temp1", "T", 70.0, vec![delayed_overheat(5)]).unwrap();

    engine.notify_value_changed("temp1", 90.0).unwrap();
    clock.advance(Duration::from_secs(5));
    assert_eq!(rec.triggered().len(), 1);

    engine.notify_value_changed("temp1", 60.0).unwrap();
    assert_eq!(rec.cleared().len(), 1);
    assert_eq!(rec.cleared()[0].previous_value, Some(Value::Float(90.0)));
    assert!(engine.get_active_alarms_for("temp1").unwrap().is_empty());
}

#[test]
fn delayed_predicate_condition() {
    let (clock, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    let stuck = DelayedCondition::new(
        string_equals("FAULT", Classification::Error, "controller fault"),
        Duration::from_secs(2),
    )
    .unwrap();
    engine.register_variable("ctl", "Controller", "OK", vec![stuck.into()]).unwrap();

    engine.notify_value_changed("ctl", "FAULT").unwrap();
    clock.advance(Duration::from_secs(2));
    assert_eq!(rec.triggered().len(), 1);
    assert_eq!(rec.triggered()[0].direction(), Direction::Custom);
    assert_eq!(rec.triggered()[0].threshold_value, None);
}

#[test]
fn acknowledge_is_silent() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    engine
        .register_variable("temp1", "T", 50.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();
    engine.notify_value_changed("temp1", 90.0).unwrap();

    assert!(engine
        .acknowledge_alarm("temp1", Classification::Warning, Direction::UpperBound, 0)
        .unwrap());
    assert!(engine.get_active_alarms().unwrap().is_empty());
    assert!(rec.cleared().is_empty());

    assert!(!engine
        .acknowledge_alarm("temp1", Classification::Warning, Direction::UpperBound, 0)
        .unwrap());

    engine.notify_value_changed("temp1", 70.0).unwrap();
    assert!(rec.cleared().is_empty());
}

#[test]
fn acknowledge_wrong_key_keeps_alarm() {
    let (_, engine) = manual_engine();
    engine
        .register_variable("temp1", "T", 50.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();
    engine.notify_value_changed("temp1", 90.0).unwrap();

    assert!(!engine
        .acknowledge_alarm("temp1", Classification::Critical, Direction::UpperBound, 0)
        .unwrap());
    assert!(!engine
        .acknowledge_alarm("temp1", Classification::Warning, Direction::UpperBound, 1)
        .unwrap());
    assert_eq!(engine.get_active_alarms().unwrap().len(), 1);
}

#[test]
fn acknowledge_all_alarms_for_variable() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    let conditions: Vec<Condition> = vec![
        upper_threshold(80.0, Classification::Warning, "hot").into(),
        upper_threshold(90.0, Classification::Critical, "very hot").into(),
    ];
    engine.register_variable("temp1", "T", 50.0, conditions).unwrap();
    engine
        .register_variable("temp2", "T2", 50.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();
    engine.notify_value_changed("temp1", 95.0).unwrap();
    engine.notify_value_changed("temp2", 95.0).unwrap();
    assert_eq!(engine.get_active_alarms().unwrap().len(), 3);

    assert_eq!(engine.acknowledge_all_alarms("temp1").unwrap(), 2);
    let remaining = engine.get_active_alarms().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].variable_id, "temp2");
    assert!(rec.cleared().is_empty());
}

#[test]
fn acknowledge_unknown_variable_fails() {
    let (_, engine) = manual_engine();
    let err = engine
        .acknowledge_alarm("ghost", Classification::Warning, Direction::UpperBound, 0)
        .unwrap_err();
    assert!(err.is_unregistered_variable());
    assert!(engine.acknowledge_all_alarms("ghost").unwrap_err().is_unregistered_variable());
}

#[test]
fn unregister_removes_everything() {
    let (clock, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    let conditions: Vec<Condition> = vec![
        upper_threshold(80.0, Classification::Warning, "hot").into(),
        delayed_overheat(5),
    ];
    engine.register_variable("temp1", "T", 50.0, conditions).unwrap();
    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert_eq!(rec.triggered().len(), 1);
    assert_eq!(clock.pending_count(), 1);

    assert!(engine.unregister_variable("temp1").unwrap());
    assert!(!engine.unregister_variable("temp1").unwrap());
    assert!(engine.get_registered_variables().unwrap().is_empty());
    assert!(engine.get_active_alarms().unwrap().is_empty());
    assert_eq!(clock.pending_count(), 0);

    clock.advance(Duration::from_secs(10));
    assert_eq!(rec.triggered().len(), 1);

    let err = engine.notify_value_changed("temp1", 91.0).unwrap_err();
    assert!(err.is_unregistered_variable());
    assert_eq!(engine.get_current_value("temp1"), Value::Null);
}

#[test]
fn reregistration_starts_fresh() {
    let (clock, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    let conditions: Vec<Condition> = vec![
        upper_threshold(80.0, Classification::Warning, "hot").into(),
        delayed_overheat(5),
    ];
    engine.register_variable("temp1", "T", 50.0, conditions).unwrap();
    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert_eq!(engine.get_active_alarms().unwrap().len(), 1);

    engine
        .register_variable("temp1", "T (new)", 10.0, vec![lower_threshold(5.0, Classification::Critical, "cold").into()])
        .unwrap();
    assert!(engine.get_active_alarms().unwrap().is_empty());
    assert_eq!(engine.get_current_value("temp1"), Value::Float(10.0));

    // The first registration's delay timer must not fire into the new one.
    clock.advance(Duration::from_secs(10));
    assert_eq!(rec.triggered().len(), 1);
    assert!(rec.cleared().is_empty());

    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert_eq!(rec.triggered().len(), 1);

    let vars = engine.get_registered_variables().unwrap();
    assert_eq!(vars.len(), 1);
    assert_eq!(vars[0].name, "T (new)");
}

#[test]
fn current_value_round_trip() {
    let (_, engine) = manual_engine();
    engine.register_variable("mode", "Mode", "auto", Vec::new()).unwrap();
    assert_eq!(engine.get_current_value("mode"), Value::from("auto"));
    engine.notify_value_changed("mode", "manual").unwrap();
    assert_eq!(engine.get_current_value("mode"), Value::from("manual"));
    assert_eq!(engine.get_current_value_as::<String>("mode"), "manual");
}

#[test]
fn mixed_conditions_fire_in_one_update() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    let conditions: Vec<Condition> = vec![
        upper_threshold(80.0, Classification::Warning, "hot").into(),
        value_jump(10.0, Classification::Information, "sudden change").into(),
    ];
    engine.register_variable("temp1", "T", 20.0, conditions).unwrap();

    engine.notify_value_changed("temp1", 85.0).unwrap();
    let triggered = rec.triggered();
    assert_eq!(triggered.len(), 2);
    assert_eq!(triggered[0].key.condition_index, 0);
    assert_eq!(triggered[1].key.condition_index, 1);
    assert_eq!(triggered[1].direction(), Direction::Custom);
    assert_ne!(triggered[0].key, triggered[1].key);

    // The jump is gone on the next small update; the threshold still holds.
    engine.notify_value_changed("temp1", 86.0).unwrap();
    let cleared = rec.cleared();
    assert_eq!(cleared.len(), 1);
    assert_eq!(cleared[0].key.condition_index, 1);
}

#[test]
fn enum_conditions() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    let running = EnumValue::new("Pump", "Running");
    let stopped = EnumValue::new("Pump", "Stopped");
    let conditions: Vec<Condition> = vec![
        enum_equals(stopped.clone(), Classification::Warning, "pump stopped").into(),
        enum_changed(Classification::Information, "pump state changed").into(),
    ];
    engine.register_variable("pump", "Pump", running.clone(), conditions).unwrap();

    engine.notify_value_changed("pump", stopped).unwrap();
    assert_eq!(rec.triggered().len(), 2);
    // Switching back is itself a change, so only the equality alarm clears.
    engine.notify_value_changed("pump", running.clone()).unwrap();
    assert_eq!(rec.cleared().len(), 1);
    engine.notify_value_changed("pump", running).unwrap();
    assert_eq!(rec.cleared().len(), 2);
}

#[test]
fn value_change_event_form() {
    let (_, engine) = manual_engine();
    let rec = Recorder::attach(&engine);
    engine
        .register_variable("temp1", "T", 20.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();

    engine
        .notify_value_change_event(ValueChangedEvent::new("temp1", 0.0, 90.0))
        .unwrap();
    assert_eq!(rec.triggered().len(), 1);
    assert_eq!(rec.triggered()[0].previous_value, Some(Value::Float(20.0)));

    let err = engine
        .notify_value_change_event(ValueChangedEvent::new("ghost", 0.0, 1.0))
        .unwrap_err();
    assert!(err.is_unregistered_variable());
}

#[test]
fn invalid_configurations_are_rejected() {
    let (_, engine) = manual_engine();

    let err = DelayedCondition::new(upper_threshold(1.0, Classification::Warning, ""), Duration::ZERO).unwrap_err();
    assert!(matches!(err, varmon::ValidationError::InvalidConfiguration { .. }));

    let err = HysteresisCondition::new(Direction::UpperBound, 75.0, 85.0, Classification::Warning, "").unwrap_err();
    assert!(matches!(err, varmon::ValidationError::InvalidConfiguration { .. }));

    let h = HysteresisCondition::new(Direction::UpperBound, 85, 75, Classification::Warning, "").unwrap();
    let err = engine.register_variable("temp1", "T", 20.0, vec![h.into()]).unwrap_err();
    assert!(err.is_type_mismatch());

    let custom = varmon::ThresholdCondition::new(Direction::Custom, 80.0, Classification::Warning, "");
    let err = engine.register_variable("temp1", "T", 20.0, vec![custom.into()]).unwrap_err();
    assert!(err.is_type_mismatch());
    assert!(!engine.is_registered("temp1"));
}

#[test]
fn unsubscribed_observer_stops_receiving() {
    let (_, engine) = manual_engine();
    let seen = Arc::new(Mutex::new(0_usize));
    let s = Arc::clone(&seen);
    let id = engine
        .subscribe_triggered(move |_| *s.lock().unwrap() += 1)
        .unwrap();
    engine
        .register_variable("temp1", "T", 20.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();

    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert!(engine.unsubscribe_triggered(id));
    engine.notify_value_changed("temp1", 20.0).unwrap();
    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert_eq!(*seen.lock().unwrap(), 1);
}

#[test]
fn stream_receives_both_channels() {
    let (_, engine) = manual_engine();
    let stream = engine.subscribe_stream().unwrap();
    engine
        .register_variable("temp1", "T", 20.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();

    engine.notify_value_changed("temp1", 90.0).unwrap();
    engine.notify_value_changed("temp1", 30.0).unwrap();

    let events = stream.drain();
    assert_eq!(events.len(), 2);
    assert!(events[0].active);
    assert!(!events[1].active);
    assert!(stream.try_recv().unwrap().is_none());

    drop(stream);
    engine.notify_value_changed("temp1", 90.0).unwrap();
    assert_eq!(engine.dropped_events(), 0);
}

#[test]
fn stream_timeout_reports_duration() {
    let (_, engine) = manual_engine();
    let stream = engine.subscribe_stream().unwrap();

    let err = stream.recv_timeout(Duration::from_millis(25)).unwrap_err();
    assert_eq!(
        err,
        varmon::MonitorError::Execution(varmon::ExecutionError::Timeout { duration_ms: 25 })
    );
}

#[test]
fn stream_overflow_counts_dropped_events() {
    let clock = Arc::new(ManualTimerProvider::new());
    let engine = MonitorEngine::with_config(
        varmon::MonitorEngineConfig { stream_capacity: 1 },
        Arc::clone(&clock) as Arc<dyn TimerProvider>,
    );
    let stream = engine.subscribe_stream().unwrap();
    engine
        .register_variable("temp1", "T", 20.0, vec![upper_threshold(80.0, Classification::Warning, "hot").into()])
        .unwrap();

    engine.notify_value_changed("temp1", 90.0).unwrap();
    engine.notify_value_changed("temp1", 30.0).unwrap();
    engine.notify_value_changed("temp1", 90.0).unwrap();

    assert_eq!(engine.dropped_events(), 2);
    assert_eq!(stream.drain().len(), 1);
}

#[test]
fn concurrent_updates_on_distinct_variables() {
    let (_, engine) = manual_engine();
    let engine = Arc::new(engine);
    let rec = Recorder::attach(&engine);

    for i in 0..8 {
        engine
            .register_variable(
                format!("v{i}"),
                format!("Variable {i}"),
                0,
                vec![upper_threshold(50, Classification::Warning, "high").into()],
            )
            .unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let id = format!("v{i}");
                for v in 0..100 {
                    engine.notify_value_changed(&id, v).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(rec.triggered().len(), 8);
    assert_eq!(engine.get_active_alarms().unwrap().len(), 8);
    for var in engine.get_registered_variables().unwrap() {
        assert_eq!(var.current_value, Value::Int(99));
    }
}

#[test]
fn concurrent_updates_on_one_variable_never_double_trigger() {
    let (_, engine) = manual_engine();
    let engine = Arc::new(engine);
    let rec = Recorder::attach(&engine);
    engine
        .register_variable("temp1", "T", 0.0, vec![upper_threshold(10.0, Classification::Warning, "hot").into()])
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    engine.notify_value_changed("temp1", 50.0).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(rec.triggered().len(), 1);
}

#[test]
fn delayed_expiry_racing_updates_triggers_once_per_key() {
    for _ in 0..20 {
        let (clock, engine) = manual_engine();
        let engine = Arc::new(engine);
        let rec = Recorder::attach(&engine);
        let conditions: Vec<Condition> = vec![
            delayed_overheat(5),
            DelayedCondition::new(
                upper_threshold(80.0, Classification::Warning, "warm"),
                Duration::from_secs(3),
            )
            .unwrap()
            .into(),
        ];
        engine.register_variable("temp1", "T", 20.0, conditions).unwrap();
        engine.notify_value_changed("temp1", 90.0).unwrap();

        let notifiers: Vec<_> = (0..3)
            .map(|t| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for n in 0..300 {
                        let value = if (n + t) % 2 == 0 { 90.0 } else { 95.0 };
                        engine.notify_value_changed("temp1", value).unwrap();
                    }
                })
            })
            .collect();
        let advancer = {
            let clock = Arc::clone(&clock);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    clock.advance(Duration::from_millis(100));
                }
            })
        };

        advancer.join().unwrap();
        for h in notifiers {
            h.join().unwrap();
        }

        let mut indices: Vec<usize> = rec.triggered().iter().map(|e| e.key.condition_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
        assert!(rec.cleared().is_empty());
        assert_eq!(engine.get_active_alarms().unwrap().len(), 2);
    }
}

#[test]
fn system_timer_drives_delayed_alarm() {
    let engine = MonitorEngine::with_timer_provider(Arc::new(SystemTimerProvider::new()));
    let stream = engine.subscribe_stream().unwrap();
    let delayed = DelayedCondition::new(
        upper_threshold(85.0, Classification::Critical, "overheating"),
        Duration::from_millis(30),
    )
    .unwrap();
    engine.register_variable("temp1", "T", 20.0, vec![delayed.into()]).unwrap();

    engine.notify_value_changed("temp1", 90.0).unwrap();
    let ev = stream.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(ev.active);
    assert_eq!(ev.variable_id, "temp1");
    assert_eq!(ev.current_value, Value::Float(90.0));
    assert_eq!(engine.get_active_alarms().unwrap().len(), 1);
}
