//! Write-back of a final snapshot onto a host object graph.
//!
//! A [`WritePlanResolver`] turns a channel list into a [`CompiledWritePlan`]: the
//! setters for every channel the host knows how to write. [`ResultWriter`]
//! caches that plan and recompiles only when the snapshot's channel list changes
//! (a different list, or a different length).

use std::sync::{Arc, Mutex, PoisonError};

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::layout::{Channel, ChannelList};
use crate::result::{read_sampled, BlendResult};
use crate::value::SampledValue;

/// Setter invoked with the target graph and one channel's value.
pub type SetterFn<G> = dyn Fn(&mut G, SampledValue<'_>) + Send + Sync + 'static;

struct PlanStep<G> {
    channel: Channel,
    setter: Arc<SetterFn<G>>,
}

/// Resolved setters for one channel list.
pub struct CompiledWritePlan<G> {
    steps: Vec<PlanStep<G>>,
    unresolved: Vec<String>,
}

impl<G> Default for CompiledWritePlan<G> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

impl<G> CompiledWritePlan<G> {
    pub fn push(&mut self, channel: &Channel, setter: Arc<SetterFn<G>>) {
        self.steps.push(PlanStep {
            channel: channel.clone(),
            setter,
        });
    }

    pub fn mark_unresolved(&mut self, property: impl Into<String>) {
        self.unresolved.push(property.into());
    }

    /// Channels with a setter.
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Properties no setter was found for.
    #[inline]
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Run every step against `target`; channels absent from the snapshot are skipped.
    pub fn write(&self, target: &mut G, result: &BlendResult) -> usize {
        let mut written = 0;
        for step in &self.steps {
            if result.flag(&step.channel) <= 0.0 {
                continue;
            }
            if let Some(value) = read_sampled(result.buffer(), result.objects(), &step.channel) {
                (step.setter)(target, value);
                written += 1;
            }
        }
        written
    }
}

impl<G> std::fmt::Debug for CompiledWritePlan<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledWritePlan")
            .field("steps", &self.steps.len())
            .field("unresolved", &self.unresolved)
            .finish()
    }
}

/// Compiles channel lists into write plans for a target graph type `G`.
pub trait WritePlanResolver<G> {
    /// Called with the automatically written channels only (user-custom channels
    /// are excluded).
    fn resolve_write_plan(&self, channels: &[&Channel]) -> CompiledWritePlan<G>;
}

/// Thread-safe map of property name -> setter closure.
pub struct SetterRegistry<G> {
    inner: Arc<Mutex<HashMap<String, Arc<SetterFn<G>>>>>,
}

impl<G> Clone for SetterRegistry<G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<G> Default for SetterRegistry<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> SetterRegistry<G> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a setter for `property`, replacing any previous one.
    pub fn register_setter<F>(&self, property: impl Into<String>, f: F)
    where
        F: Fn(&mut G, SampledValue<'_>) + Send + Sync + 'static,
    {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(property.into(), Arc::new(f));
    }

    pub fn get_setter(&self, property: &str) -> Option<Arc<SetterFn<G>>> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(property).cloned()
    }
}

impl<G> WritePlanResolver<G> for SetterRegistry<G> {
    fn resolve_write_plan(&self, channels: &[&Channel]) -> CompiledWritePlan<G> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut plan = CompiledWritePlan::default();
        for channel in channels {
            match guard.get(&channel.property) {
                Some(setter) => plan.push(channel, setter.clone()),
                None => plan.mark_unresolved(channel.property.as_str()),
            }
        }
        plan
    }
}

/// Applies snapshots to a target graph through a cached write plan.
pub struct ResultWriter<G, R> {
    resolver: R,
    plan: CompiledWritePlan<G>,
    plan_channels: Option<ChannelList>,
    plan_len: usize,
    user_channels: Vec<Channel>,
    compilations: usize,
}

impl<G, R: WritePlanResolver<G>> ResultWriter<G, R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            plan: CompiledWritePlan::default(),
            plan_channels: None,
            plan_len: 0,
            user_channels: Vec::new(),
            compilations: 0,
        }
    }

    #[inline]
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    #[inline]
    pub fn plan(&self) -> &CompiledWritePlan<G> {
        &self.plan
    }

    /// Number of times a plan has been compiled.
    #[inline]
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    /// User-custom channels of the last applied channel list.
    #[inline]
    pub fn user_channels(&self) -> &[Channel] {
        &self.user_channels
    }

    /// Write `result` onto `target`, recompiling the plan if its channel list changed.
    /// Returns the number of channels written.
    pub fn apply(&mut self, target: &mut G, result: &BlendResult) -> usize {
        let Some(channels) = result.channels() else {
            return 0;
        };
        let stale = match &self.plan_channels {
            Some(current) => !Arc::ptr_eq(current, channels) || self.plan_len != channels.len(),
            None => true,
        };
        if stale {
            self.compile(channels);
        }
        self.plan.write(target, result)
    }

    /// Drop the cached plan so the next `apply` recompiles.
    pub fn invalidate(&mut self) {
        self.plan_channels = None;
    }

    fn compile(&mut self, channels: &ChannelList) {
        let (user, automatic): (Vec<&Channel>, Vec<&Channel>) =
            channels.iter().partition(|c| c.is_user_custom_property);
        self.plan = self.resolver.resolve_write_plan(&automatic);
        self.user_channels = user.into_iter().cloned().collect();
        self.plan_channels = Some(channels.clone());
        self.plan_len = channels.len();
        self.compilations += 1;
        debug!(
            channels = channels.len(),
            resolved = self.plan.len(),
            unresolved = self.plan.unresolved().len(),
            user = self.user_channels.len(),
            "write plan compiled"
        );
        if !self.plan.unresolved().is_empty() {
            warn!(
                unresolved = ?self.plan.unresolved(),
                "write plan left channels without a setter"
            );
        }
    }

    /// Read one channel of `result` by name, typically a user-custom channel.
    pub fn read_channel<'r>(
        &self,
        result: &'r BlendResult,
        property: &str,
    ) -> Option<SampledValue<'r>> {
        result.value_by_name(property)
    }
}
