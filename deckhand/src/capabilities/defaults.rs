use super::context_ops::{ChangeContext, CurrentContext};
use super::environment_ops::{
    CloneEnvironment, DeleteEnvironments, GetEnvironmentDependencyGraph, ListEnvironments,
};
use super::general::{OpenUrlInBrowser, SetReasoningOutput};
use super::helm_ops::{
    DeleteApplication, DeployApplication, GenerateUpgradeApplicationValues,
    GetApplicationAccessEndpoints, GetApplicationDetail, ListApplications, SearchHelmChart,
    UpgradeApplication,
};
use super::k8s_ops::{
    ApplyKubernetesResources, ConstructKubernetesResources, DeleteKubernetesResource,
    GetKubernetesIngressAccessEndpoints, GetKubernetesPodLogs, GetKubernetesResourceDetail,
    GetKubernetesServiceAccessEndpoints, ListKubernetesResources, WatchKubernetesResources,
};
use super::project_ops::ListProjects;
use super::registry::{CapabilityRegistry, RegistryError};
use super::service_ops::{
    ConstructServiceToCreate, ConstructServiceToUpdate, CreateService, DeleteServices,
    GetService, GetServiceAccessEndpoints, GetServiceDependencyGraph, GetServiceResourceKeys,
    GetServiceResourceLogs, GetServiceResources, ListServices, ListServicesInAllEnvironments,
    UpdateService,
};
use super::template_ops::{FindMatchingTemplate, GetTemplateSchema};
use super::watch::{Inform, InformServiceReady, WatchServices};
use crate::kubernetes::{ArtifactHub, ClusterClient, Helm};
use crate::llm::LanguageModel;
use crate::platform::PlatformClient;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Everything the platform catalog needs to be built.
#[derive(Clone)]
pub struct CatalogDeps {
    pub client: PlatformClient,
    pub model: Arc<dyn LanguageModel>,
    pub show_reasoning: Arc<AtomicBool>,
    pub inform: UnboundedSender<Inform>,
}

/// Build the registry with the full platform catalog, in the order the model
/// sees it.
pub fn default_registry(deps: CatalogDeps) -> Result<CapabilityRegistry, RegistryError> {
    let CatalogDeps {
        client,
        model,
        show_reasoning,
        inform,
    } = deps;
    let mut registry = CapabilityRegistry::new();

    registry.register_handler(CurrentContext)?;
    registry.register_handler(ChangeContext::new(client.clone()))?;
    registry.register_handler(ListProjects::new(client.clone()))?;
    registry.register_handler(ListEnvironments::new(client.clone()))?;
    registry.register_handler(DeleteEnvironments::new(client.clone()))?;
    registry.register_handler(CloneEnvironment::new(client.clone()))?;
    registry.register_handler(GetEnvironmentDependencyGraph::new(client.clone()))?;

    registry.register_handler(FindMatchingTemplate::new(client.clone(), model.clone()))?;
    registry.register_handler(GetTemplateSchema::new(client.clone()))?;
    registry.register_handler(ConstructServiceToCreate::new(client.clone(), model.clone()))?;
    registry.register_handler(ConstructServiceToUpdate::new(client.clone(), model))?;

    registry.register_handler(GetService::new(client.clone()))?;
    registry.register_handler(ListServices::new(client.clone()))?;
    registry.register_handler(WatchServices::new(client.clone()))?;
    registry.register_handler(ListServicesInAllEnvironments::new(client.clone()))?;
    registry.register_handler(InformServiceReady::new(client.clone(), inform))?;
    registry.register_handler(CreateService::new(client.clone()))?;
    registry.register_handler(UpdateService::new(client.clone()))?;
    registry.register_handler(DeleteServices::new(client.clone()))?;
    registry.register_handler(GetServiceResources::new(client.clone()))?;
    registry.register_handler(GetServiceResourceKeys::new(client.clone()))?;
    registry.register_handler(GetServiceResourceLogs::for_diagnose(client.clone()))?;
    registry.register_handler(GetServiceResourceLogs::return_direct(client.clone()))?;
    registry.register_handler(GetServiceAccessEndpoints::new(client.clone()))?;
    registry.register_handler(GetServiceDependencyGraph::new(client))?;

    registry.register_handler(SetReasoningOutput::show(show_reasoning.clone()))?;
    registry.register_handler(SetReasoningOutput::hide(show_reasoning))?;
    registry.register_handler(OpenUrlInBrowser)?;

    debug!("Registered {} capabilities", registry.len());
    Ok(registry)
}

/// Everything the Kubernetes catalog needs to be built.
#[derive(Clone)]
pub struct KubernetesDeps {
    pub cluster: ClusterClient,
    pub helm: Helm,
    pub hub: ArtifactHub,
    pub model: Arc<dyn LanguageModel>,
    pub show_reasoning: Arc<AtomicBool>,
}

/// Build the registry with the Kubernetes catalog: raw resources first, then
/// helm applications.
pub fn kubernetes_registry(deps: KubernetesDeps) -> Result<CapabilityRegistry, RegistryError> {
    let KubernetesDeps {
        cluster,
        helm,
        hub,
        model,
        show_reasoning,
    } = deps;
    let mut registry = CapabilityRegistry::new();

    registry.register_handler(ListKubernetesResources::new(cluster.clone()))?;
    registry.register_handler(GetKubernetesResourceDetail::new(cluster.clone()))?;
    registry.register_handler(GetKubernetesServiceAccessEndpoints::new(cluster.clone()))?;
    registry.register_handler(GetKubernetesIngressAccessEndpoints::new(cluster.clone()))?;
    registry.register_handler(GetKubernetesPodLogs::new(cluster.clone()))?;
    registry.register_handler(WatchKubernetesResources::new(cluster.clone()))?;
    registry.register_handler(DeleteKubernetesResource::new(cluster.clone()))?;
    registry.register_handler(ConstructKubernetesResources::new(model.clone()))?;
    registry.register_handler(ApplyKubernetesResources::new(cluster.clone()))?;

    registry.register_handler(SearchHelmChart::new(hub, helm.clone(), model.clone()))?;
    registry.register_handler(DeployApplication::new(helm.clone()))?;
    registry.register_handler(GenerateUpgradeApplicationValues::new(helm.clone(), model))?;
    registry.register_handler(UpgradeApplication::new(helm.clone()))?;
    registry.register_handler(ListApplications::new(helm.clone(), cluster.clone()))?;
    registry.register_handler(GetApplicationDetail::new(helm.clone()))?;
    registry.register_handler(GetApplicationAccessEndpoints::new(helm.clone(), cluster))?;
    registry.register_handler(OpenUrlInBrowser)?;
    registry.register_handler(DeleteApplication::new(helm))?;

    registry.register_handler(SetReasoningOutput::show(show_reasoning.clone()))?;
    registry.register_handler(SetReasoningOutput::hide(show_reasoning))?;

    debug!("Registered {} kubernetes capabilities", registry.len());
    Ok(registry)
}
