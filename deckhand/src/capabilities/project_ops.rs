use super::capability::{CapabilityDescriptor, CapabilityError, CapabilityHandler, NoInput};
use super::render_list;
use crate::context::ContextStore;
use crate::platform::PlatformClient;
use async_trait::async_trait;

pub struct ListProjects {
    client: PlatformClient,
}

impl ListProjects {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for ListProjects {
    type Input = NoInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("list_projects", "List projects.")
    }

    async fn call(&self, _input: NoInput, _context: &ContextStore) -> Result<String, CapabilityError> {
        let projects = self.client.list_projects().await?;
        render_list(&projects, "No projects found.")
    }
}
