use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Datasets: name is globally unique, enforced before any revision
        // is written.
        manager
            .create_table(
                Table::create()
                    .table(Datasets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Datasets::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Datasets::Name).text().not_null().unique_key())
                    .col(ColumnDef::new(Datasets::Description).text())
                    .col(ColumnDef::new(Datasets::Metadata).json().not_null())
                    .col(ColumnDef::new(Datasets::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Datasets::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Dataset versions: the autoincrement id is the sortable version id
        // and is never reused.
        manager
            .create_table(
                Table::create()
                    .table(DatasetVersions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetVersions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DatasetVersions::DatasetId).integer().not_null())
                    .col(ColumnDef::new(DatasetVersions::Description).text())
                    .col(ColumnDef::new(DatasetVersions::Metadata).json().not_null())
                    .col(ColumnDef::new(DatasetVersions::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dataset_versions_dataset_id")
                            .from(DatasetVersions::Table, DatasetVersions::DatasetId)
                            .to(Datasets::Table, Datasets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DatasetExamples::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetExamples::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DatasetExamples::DatasetId).integer().not_null())
                    .col(ColumnDef::new(DatasetExamples::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dataset_examples_dataset_id")
                            .from(DatasetExamples::Table, DatasetExamples::DatasetId)
                            .to(Datasets::Table, Datasets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The append-only revision log. One revision per (example, version);
        // DELETE rows are tombstones with empty payloads.
        manager
            .create_table(
                Table::create()
                    .table(DatasetExampleRevisions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetExampleRevisions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DatasetExampleRevisions::DatasetExampleId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DatasetExampleRevisions::DatasetVersionId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DatasetExampleRevisions::Input).json().not_null())
                    .col(ColumnDef::new(DatasetExampleRevisions::Output).json().not_null())
                    .col(ColumnDef::new(DatasetExampleRevisions::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(DatasetExampleRevisions::RevisionKind)
                            .text()
                            .not_null()
                            .check(
                                Expr::col(DatasetExampleRevisions::RevisionKind)
                                    .is_in(["CREATE", "PATCH", "DELETE"]),
                            ),
                    )
                    .col(ColumnDef::new(DatasetExampleRevisions::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dataset_example_revisions_example_id")
                            .from(
                                DatasetExampleRevisions::Table,
                                DatasetExampleRevisions::DatasetExampleId,
                            )
                            .to(DatasetExamples::Table, DatasetExamples::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dataset_example_revisions_version_id")
                            .from(
                                DatasetExampleRevisions::Table,
                                DatasetExampleRevisions::DatasetVersionId,
                            )
                            .to(DatasetVersions::Table, DatasetVersions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_dataset_example_revisions_example_id_version_id")
                    .table(DatasetExampleRevisions::Table)
                    .col(DatasetExampleRevisions::DatasetExampleId)
                    .col(DatasetExampleRevisions::DatasetVersionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExperimentRunAnnotations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExperimentRunAnnotations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExperimentRunAnnotations::ExperimentRunId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExperimentRunAnnotations::Name).text().not_null())
                    .col(ColumnDef::new(ExperimentRunAnnotations::AnnotatorKind).text().not_null())
                    .col(ColumnDef::new(ExperimentRunAnnotations::Label).text())
                    .col(ColumnDef::new(ExperimentRunAnnotations::Score).double())
                    .col(ColumnDef::new(ExperimentRunAnnotations::Explanation).text())
                    .col(ColumnDef::new(ExperimentRunAnnotations::Error).text())
                    .col(ColumnDef::new(ExperimentRunAnnotations::Metadata).json().not_null())
                    .col(ColumnDef::new(ExperimentRunAnnotations::TraceId).text())
                    .col(ColumnDef::new(ExperimentRunAnnotations::StartTime).timestamp().not_null())
                    .col(ColumnDef::new(ExperimentRunAnnotations::EndTime).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_experiment_run_annotations_run_id_name")
                    .table(ExperimentRunAnnotations::Table)
                    .col(ExperimentRunAnnotations::ExperimentRunId)
                    .col(ExperimentRunAnnotations::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExperimentRunAnnotations::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DatasetExampleRevisions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DatasetExamples::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DatasetVersions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Datasets::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Datasets {
    Table,
    Id,
    Name,
    Description,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DatasetVersions {
    Table,
    Id,
    DatasetId,
    Description,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DatasetExamples {
    Table,
    Id,
    DatasetId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DatasetExampleRevisions {
    Table,
    Id,
    DatasetExampleId,
    DatasetVersionId,
    Input,
    Output,
    Metadata,
    RevisionKind,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ExperimentRunAnnotations {
    Table,
    Id,
    ExperimentRunId,
    Name,
    AnnotatorKind,
    Label,
    Score,
    Explanation,
    Error,
    Metadata,
    TraceId,
    StartTime,
    EndTime,
}
