use serde_json::{Value, json};

use crate::controller::{DuplicatePolicy, NavController, NavUpdateKind};
use crate::destination::{ChildFlowSpec, DestinationRef, DestinationSet};
use crate::entry::NavEntry;
use crate::error::{NavError, Result};
use crate::logging::{LogLevel, json_kv};
use crate::metrics::NavMetrics;

/// One step of a route. Element segments carry a resolved destination
/// handle; named segments are looked up in the cursor controller's set and
/// their raw args decoded through the destination's `ArgsCodec`.
pub enum RouteSegment {
    Element {
        destination: DestinationRef,
        args: Option<Value>,
    },
    Named {
        name: String,
        args: Option<String>,
    },
    /// Descend into the named nested flow of the cursor destination before
    /// resolving the remaining segments.
    Child { key: String },
}

/// A declarative navigation request resolved atomically against a
/// controller tree.
pub struct Route {
    segments: Vec<RouteSegment>,
    force_replace: bool,
    duplicates: Option<DuplicatePolicy>,
}

impl Route {
    pub fn builder() -> RouteBuilder {
        RouteBuilder {
            segments: Vec::new(),
            force_replace: false,
            duplicates: None,
        }
    }

    pub fn segments(&self) -> &[RouteSegment] {
        &self.segments
    }
}

pub struct RouteBuilder {
    segments: Vec<RouteSegment>,
    force_replace: bool,
    duplicates: Option<DuplicatePolicy>,
}

impl RouteBuilder {
    pub fn element(mut self, destination: &DestinationRef) -> Self {
        self.segments.push(RouteSegment::Element {
            destination: destination.clone(),
            args: None,
        });
        self
    }

    pub fn element_with(mut self, destination: &DestinationRef, args: Value) -> Self {
        self.segments.push(RouteSegment::Element {
            destination: destination.clone(),
            args: Some(args),
        });
        self
    }

    pub fn destination(mut self, name: impl Into<String>) -> Self {
        self.segments.push(RouteSegment::Named {
            name: name.into(),
            args: None,
        });
        self
    }

    pub fn destination_with(mut self, name: impl Into<String>, raw_args: impl Into<String>) -> Self {
        self.segments.push(RouteSegment::Named {
            name: name.into(),
            args: Some(raw_args.into()),
        });
        self
    }

    pub fn child(mut self, key: impl Into<String>) -> Self {
        self.segments.push(RouteSegment::Child { key: key.into() });
        self
    }

    /// Make the final resolved element replace the entry under it instead
    /// of stacking on top. Redirect-style deep links use this.
    pub fn force_replace(mut self) -> Self {
        self.force_replace = true;
        self
    }

    /// Override the configured duplicate policy for this route only.
    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = Some(policy);
        self
    }

    pub fn finish(self) -> Route {
        Route {
            segments: self.segments,
            force_replace: self.force_replace,
            duplicates: self.duplicates,
        }
    }
}

enum PlannedStep {
    Push {
        destination: DestinationRef,
        args: Option<Value>,
    },
    Replace {
        destination: DestinationRef,
        args: Option<Value>,
    },
    UpdateArgs { args: Value },
}

enum ChildSource {
    Existing,
    Seed(ChildFlowSpec),
}

/// Fully validated mutation script for one controller level. Applying a
/// plan cannot fail; every lookup already succeeded during planning.
struct LevelPlan {
    steps: Vec<PlannedStep>,
    descend: Option<(String, ChildSource, Box<LevelPlan>)>,
}

impl NavController {
    /// Resolve a route atomically: plan every segment first, then apply.
    /// Any unresolvable segment aborts the whole route with zero mutation.
    pub fn route(&mut self, route: Route) -> Result<()> {
        if route.segments.is_empty() {
            return Ok(());
        }
        let policy = route
            .duplicates
            .unwrap_or(self.ctx().config().route_duplicates);
        let mut plan = plan_level(
            self.destinations(),
            self.current(),
            self.current().map(|e| e.destination().clone()),
            &route.segments,
            policy,
        )?;
        if route.force_replace {
            promote_last_push(&mut plan);
        }
        apply_level(self, plan);
        self.record_metric(NavMetrics::record_route);
        self.log_nav(
            LogLevel::Info,
            "routed",
            [
                json_kv("segments", json!(route.segments.len())),
                json_kv("force_replace", json!(route.force_replace)),
            ],
        );
        Ok(())
    }
}

fn plan_level(
    destinations: &DestinationSet,
    current: Option<&NavEntry>,
    current_dest: Option<DestinationRef>,
    segments: &[RouteSegment],
    policy: DuplicatePolicy,
) -> Result<LevelPlan> {
    let mut steps: Vec<PlannedStep> = Vec::new();
    let mut effective = current_dest;
    let mut pushed_any = false;
    let mut descend = None;

    for (index, segment) in segments.iter().enumerate() {
        match segment {
            RouteSegment::Element { destination, args } => {
                if !destinations.contains(destination) {
                    return Err(NavError::RouteAborted(format!(
                        "segment {index}: '{}' is not declared on this controller",
                        destination.name()
                    )));
                }
                plan_step(&mut steps, &mut effective, &mut pushed_any, destination.clone(), args.clone(), policy);
            }
            RouteSegment::Named { name, args } => {
                let destination = destinations.get(name).cloned().ok_or_else(|| {
                    NavError::RouteAborted(format!(
                        "segment {index}: no destination named '{name}'"
                    ))
                })?;
                let decoded = decode_raw_args(&destination, args.as_deref())?;
                plan_step(&mut steps, &mut effective, &mut pushed_any, destination, decoded, policy);
            }
            RouteSegment::Child { key } => {
                let rest = &segments[index + 1..];
                // An already-instantiated child wins over re-seeding, but
                // only while the real current entry is still the cursor.
                if !pushed_any {
                    if let Some(child) = current.and_then(|entry| entry.child(key)) {
                        let child_plan = plan_level(
                            child.destinations(),
                            child.current(),
                            child.current().map(|e| e.destination().clone()),
                            rest,
                            policy,
                        )?;
                        descend = Some((key.clone(), ChildSource::Existing, Box::new(child_plan)));
                        break;
                    }
                }
                let host = effective.as_ref().ok_or_else(|| {
                    NavError::RouteAborted(format!(
                        "segment {index}: child '{key}' descends from an empty stack"
                    ))
                })?;
                let spec = host
                    .nested_flows()
                    .and_then(|flows| flows.child(key))
                    .cloned()
                    .ok_or_else(|| {
                        NavError::RouteAborted(format!(
                            "segment {index}: '{}' declares no nested flow '{key}'",
                            host.name()
                        ))
                    })?;
                let seed_set = DestinationSet::new(spec.destinations.iter().cloned());
                let start = seed_set.get(&spec.start).cloned().ok_or_else(|| {
                    NavError::RouteAborted(format!(
                        "segment {index}: nested flow '{key}' starts at undeclared '{}'",
                        spec.start
                    ))
                })?;
                let child_plan = plan_level(&seed_set, None, Some(start), rest, policy)?;
                descend = Some((key.clone(), ChildSource::Seed(spec), Box::new(child_plan)));
                break;
            }
        }
    }

    Ok(LevelPlan { steps, descend })
}

fn plan_step(
    steps: &mut Vec<PlannedStep>,
    effective: &mut Option<DestinationRef>,
    pushed_any: &mut bool,
    destination: DestinationRef,
    args: Option<Value>,
    policy: DuplicatePolicy,
) {
    let is_duplicate = effective
        .as_ref()
        .is_some_and(|cur| cur.name() == destination.name());
    if is_duplicate && policy == DuplicatePolicy::UpdateArgs {
        // An arg-less duplicate segment is already satisfied by the current
        // entry; its existing args stay as they are.
        if let Some(args) = args {
            steps.push(PlannedStep::UpdateArgs { args });
        }
        return;
    }
    steps.push(PlannedStep::Push {
        destination: destination.clone(),
        args,
    });
    *effective = Some(destination);
    *pushed_any = true;
}

fn decode_raw_args(destination: &DestinationRef, raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match destination.args_codec() {
        Some(codec) => {
            codec
                .string_to_args(raw)
                .map(Some)
                .ok_or_else(|| NavError::ArgsCodec {
                    destination: destination.name().to_string(),
                    reason: format!("codec rejected raw args {raw:?}"),
                })
        }
        // No codec declared: carry the raw text through as a string arg.
        None => Ok(Some(Value::String(raw.to_string()))),
    }
}

fn promote_last_push(plan: &mut LevelPlan) {
    match plan.descend.as_mut() {
        Some((_, _, child)) => promote_last_push(child),
        None => {
            if let Some(last) = plan.steps.last_mut() {
                if let PlannedStep::Push { destination, args } = last {
                    *last = PlannedStep::Replace {
                        destination: destination.clone(),
                        args: args.take(),
                    };
                }
            }
        }
    }
}

fn apply_level(controller: &mut NavController, plan: LevelPlan) {
    let mutated = !plan.steps.is_empty();
    for step in plan.steps {
        match step {
            PlannedStep::Push { destination, args } => {
                let entry = controller.new_entry(destination, args, None);
                controller.stack_mut().push(entry);
            }
            PlannedStep::Replace { destination, args } => {
                let entry = controller.new_entry(destination, args, None);
                if let Some(old) = controller.stack_mut().replace(entry) {
                    controller.close_entry(old);
                }
            }
            PlannedStep::UpdateArgs { args } => {
                if let Some(current) = controller.current_mut() {
                    current.set_nav_args(Some(args));
                }
            }
        }
    }
    if mutated {
        controller.mark_forward(true);
        controller.push_update(NavUpdateKind::Routed, None);
    }
    if let Some((key, source, child_plan)) = plan.descend {
        let child = match source {
            ChildSource::Existing => controller
                .current_mut()
                .and_then(|entry| entry.child_mut(&key))
                .expect("planned against an existing child"),
            ChildSource::Seed(spec) => controller
                .child_controller(&key, &spec)
                .expect("seed validated during planning"),
        };
        apply_level(child, *child_plan);
    }
}
