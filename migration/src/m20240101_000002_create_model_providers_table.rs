use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ModelProviders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ModelProviders::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::Identifier)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::Name)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::BaseUrl)
                            .string_len(500)
                            .not_null(),
                    )
                    // 仅保存凭据保险库生成的密文
                    .col(ColumnDef::new(ModelProviders::ApiKey).text().not_null())
                    .col(
                        ColumnDef::new(ModelProviders::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::AuthType)
                            .string_len(20)
                            .not_null()
                            .default("bearer"),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::AuthLocation)
                            .string_len(20)
                            .not_null()
                            .default("header"),
                    )
                    .col(ColumnDef::new(ModelProviders::AuthKeyName).string_len(100))
                    .col(
                        ColumnDef::new(ModelProviders::CustomHeadersJson)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::RequestMappingJson)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::ResponseMappingJson)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::ModelsJson)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::TokenUsage)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::Revision)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ModelProviders::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_model_providers_active")
                    .table(ModelProviders::Table)
                    .col(ModelProviders::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ModelProviders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ModelProviders {
    Table,
    Id,
    Identifier,
    Name,
    BaseUrl,
    ApiKey,
    IsActive,
    AuthType,
    AuthLocation,
    AuthKeyName,
    CustomHeadersJson,
    RequestMappingJson,
    ResponseMappingJson,
    ModelsJson,
    TokenUsage,
    Revision,
    CreatedAt,
    UpdatedAt,
}
