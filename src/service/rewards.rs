use super::validation::{require_name, require_optional_name};
use super::{InsightsService, by_parent};
use crate::cascade::CascadeSummary;
use crate::error::Result;
use crate::models::{
    Consumer, ConsumerPatch, NewConsumer, NewRedemptionItem, NewRewardProgram, RedemptionItem,
    RedemptionItemPatch, RewardProgram, RewardProgramPatch, to_fields,
};
use crate::store::{Collection, Query};

impl InsightsService {
    pub async fn add_reward_program(&self, program: NewRewardProgram) -> Result<String> {
        require_name("reward program", &program.name)?;
        self.create_entity("add_reward_program", &Collection::RewardPrograms, to_fields(&program)?)
            .await
    }

    pub async fn get_reward_program(&self, id: &str) -> Result<Option<RewardProgram>> {
        self.fetch("get_reward_program", &Collection::RewardPrograms, id).await
    }

    pub async fn list_reward_programs(&self) -> Result<Vec<RewardProgram>> {
        self.fetch_list("list_reward_programs", &Collection::RewardPrograms, &Query::by_name())
            .await
    }

    pub async fn update_reward_program(&self, id: &str, patch: RewardProgramPatch) -> Result<()> {
        require_optional_name("reward program", patch.name.as_deref())?;
        self.update_entity("update_reward_program", &Collection::RewardPrograms, id, to_fields(&patch)?)
            .await
    }

    /// Surveys and redemption items that point at the program keep
    /// existing with the reference cleared
    pub async fn delete_reward_program(&self, id: &str) -> Result<CascadeSummary> {
        self.cascade.delete_reward_program(id).await
    }

    pub async fn add_redemption_item(&self, item: NewRedemptionItem) -> Result<String> {
        require_name("redemption item", &item.name)?;
        self.create_entity("add_redemption_item", &Collection::RedemptionItems, to_fields(&item)?)
            .await
    }

    pub async fn get_redemption_item(&self, id: &str) -> Result<Option<RedemptionItem>> {
        self.fetch("get_redemption_item", &Collection::RedemptionItems, id).await
    }

    pub async fn list_redemption_items(&self, reward_program_id: Option<&str>) -> Result<Vec<RedemptionItem>> {
        self.fetch_list(
            "list_redemption_items",
            &Collection::RedemptionItems,
            &by_parent("rewardProgramId", reward_program_id),
        )
        .await
    }

    pub async fn update_redemption_item(&self, id: &str, patch: RedemptionItemPatch) -> Result<()> {
        require_optional_name("redemption item", patch.name.as_deref())?;
        self.update_entity("update_redemption_item", &Collection::RedemptionItems, id, to_fields(&patch)?)
            .await
    }

    pub async fn delete_redemption_item(&self, id: &str) -> Result<()> {
        self.delete_entity("delete_redemption_item", &Collection::RedemptionItems, id)
            .await
    }

    pub async fn add_consumer(&self, consumer: NewConsumer) -> Result<String> {
        require_name("consumer", &consumer.name)?;
        self.create_entity("add_consumer", &Collection::Consumers, to_fields(&consumer)?)
            .await
    }

    pub async fn get_consumer(&self, id: &str) -> Result<Option<Consumer>> {
        self.fetch("get_consumer", &Collection::Consumers, id).await
    }

    pub async fn list_consumers(&self) -> Result<Vec<Consumer>> {
        self.fetch_list("list_consumers", &Collection::Consumers, &Query::by_name())
            .await
    }

    pub async fn update_consumer(&self, id: &str, patch: ConsumerPatch) -> Result<()> {
        require_optional_name("consumer", patch.name.as_deref())?;
        self.update_entity("update_consumer", &Collection::Consumers, id, to_fields(&patch)?)
            .await
    }

    pub async fn delete_consumer(&self, id: &str) -> Result<()> {
        self.delete_entity("delete_consumer", &Collection::Consumers, id).await
    }
}
