//! Document analysis using AWS Textract.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_textract::{
    primitives::Blob,
    types::{
        Block, BlockType, Document, EntityType, FeatureType, RelationshipType,
        SelectionStatus,
    },
};

use crate::{
    aws::AwsContext,
    error::{PipelineError, ServiceResultExt as _, Stage},
    prelude::*,
};

use super::{
    AnalysisFeature, DetectedTable, DocumentAnalysisResult, DocumentAnalyzer, FieldPair,
    InputImage,
};

/// Document analyzer wrapping the AWS Textract `AnalyzeDocument` API.
pub struct TextractAnalyzer {
    /// AWS Textract client.
    client: aws_sdk_textract::Client,
}

impl TextractAnalyzer {
    /// Create a new Textract analyzer.
    pub fn new(aws: &AwsContext) -> Self {
        Self {
            client: aws_sdk_textract::Client::new(aws.sdk_config()),
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for TextractAnalyzer {
    #[instrument(level = "debug", skip_all, fields(image = %image.file_name))]
    async fn analyze(
        &self,
        image: &InputImage,
        features: &[AnalysisFeature],
    ) -> Result<DocumentAnalysisResult, PipelineError> {
        let document = Document::builder()
            .bytes(Blob::new(image.data.clone()))
            .build();
        let feature_types = features
            .iter()
            .map(|feature| match feature {
                AnalysisFeature::Tables => FeatureType::Tables,
                AnalysisFeature::Forms => FeatureType::Forms,
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .analyze_document()
            .document(document)
            .set_feature_types(Some(feature_types))
            .send()
            .await
            .for_stage(Stage::Analysis)?;
        trace!("Document response: {response:#?}");

        let result = analysis_from_blocks(response.blocks())?;
        info!(
            lines = result.lines.len(),
            tables = result.tables.len(),
            field_pairs = result.field_pairs.len(),
            "Analyzed document"
        );
        Ok(result)
    }
}

/// Convert a flat list of Textract blocks into a [`DocumentAnalysisResult`].
pub fn analysis_from_blocks(
    blocks: &[Block],
) -> Result<DocumentAnalysisResult, PipelineError> {
    // Build a table of blocks by ID.
    let mut blocks_by_id = HashMap::new();
    for block in blocks {
        let Some(block_id) = block.id() else {
            continue;
        };
        blocks_by_id.insert(block_id, block);
    }
    let graph = BlockGraph { blocks_by_id };

    let mut result = DocumentAnalysisResult::default();
    for block in blocks {
        match block.block_type() {
            Some(BlockType::Line) => {
                if let Some(text) = block.text() {
                    result.lines.push(text.to_owned());
                }
            }
            Some(BlockType::Table) => {
                result.tables.push(graph.table(block)?);
            }
            Some(BlockType::KeyValueSet)
                if block.entity_types().contains(&EntityType::Key) =>
            {
                result.field_pairs.push(graph.field_pair(block)?);
            }
            _ => {}
        }
    }
    Ok(result)
}

/// Blocks by ID. Used to look up child blocks.
struct BlockGraph<'a> {
    blocks_by_id: HashMap<&'a str, &'a Block>,
}

impl<'a> BlockGraph<'a> {
    /// Find the blocks related to `block` by `relationship`.
    fn related(
        &self,
        block: &'a Block,
        relationship: RelationshipType,
    ) -> Result<Vec<&'a Block>, PipelineError> {
        let mut related = Vec::new();
        for rel in block.relationships() {
            if rel.r#type() != Some(&relationship) {
                continue;
            }
            for id in rel.ids() {
                let child = self.blocks_by_id.get(id.as_str()).ok_or_else(|| {
                    PipelineError::projection(format!("Textract block {id} not found"))
                })?;
                related.push(*child);
            }
        }
        Ok(related)
    }

    /// The text of a block's children, joined by single spaces.
    ///
    /// Selected check boxes show up as `X`.
    fn child_text(&self, block: &'a Block) -> Result<String, PipelineError> {
        let mut words = Vec::new();
        for child in self.related(block, RelationshipType::Child)? {
            match child.block_type() {
                Some(BlockType::Word) => {
                    if let Some(text) = child.text() {
                        words.push(text);
                    }
                }
                Some(BlockType::SelectionElement)
                    if child.selection_status() == Some(&SelectionStatus::Selected) =>
                {
                    words.push("X");
                }
                _ => {}
            }
        }
        Ok(words.join(" "))
    }

    /// Build a grid from a `TABLE` block's `CELL` children.
    fn table(&self, table: &'a Block) -> Result<DetectedTable, PipelineError> {
        let mut cells: BTreeMap<i32, BTreeMap<i32, String>> = BTreeMap::new();
        let mut column_count = 0;
        for cell in self.related(table, RelationshipType::Child)? {
            if cell.block_type() != Some(&BlockType::Cell) {
                continue;
            }
            let (Some(row), Some(column)) = (cell.row_index(), cell.column_index())
            else {
                return Err(PipelineError::projection(format!(
                    "Textract cell {} has no row or column index",
                    cell.id().unwrap_or("UNKNOWN")
                )));
            };
            column_count = column_count.max(column);
            cells
                .entry(row)
                .or_default()
                .insert(column, self.child_text(cell)?);
        }

        // Fill in any holes so every row has every column.
        let rows = cells
            .into_values()
            .map(|mut row| {
                (1..=column_count)
                    .map(|column| row.remove(&column).unwrap_or_default())
                    .collect()
            })
            .collect();
        Ok(DetectedTable { rows })
    }

    /// Build a field pair from a `KEY_VALUE_SET` block with a `KEY` entity type.
    fn field_pair(&self, key: &'a Block) -> Result<FieldPair, PipelineError> {
        let key_text = self.child_text(key)?;
        let mut value_text = String::new();
        for value in self.related(key, RelationshipType::Value)? {
            let text = self.child_text(value)?;
            if text.is_empty() {
                continue;
            }
            if !value_text.is_empty() {
                value_text.push(' ');
            }
            value_text.push_str(&text);
        }
        Ok(FieldPair::new(key_text, value_text))
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_textract::types::Relationship;

    use super::*;

    fn word(id: &str, text: &str) -> Block {
        Block::builder()
            .id(id)
            .block_type(BlockType::Word)
            .text(text)
            .build()
    }

    fn with_children(
        builder: aws_sdk_textract::types::builders::BlockBuilder,
        rel: RelationshipType,
        ids: &[&str],
    ) -> aws_sdk_textract::types::builders::BlockBuilder {
        let mut relationship = Relationship::builder().r#type(rel);
        for id in ids {
            relationship = relationship.ids(*id);
        }
        builder.relationships(relationship.build())
    }

    fn cell(id: &str, row: i32, column: i32, words: &[&str]) -> Block {
        let builder = Block::builder()
            .id(id)
            .block_type(BlockType::Cell)
            .row_index(row)
            .column_index(column);
        if words.is_empty() {
            builder.build()
        } else {
            with_children(builder, RelationshipType::Child, words).build()
        }
    }

    fn sample_blocks() -> Vec<Block> {
        let table = with_children(
            Block::builder().id("t1").block_type(BlockType::Table),
            RelationshipType::Child,
            &["c11", "c12", "c21", "c22"],
        )
        .build();
        let key = with_children(
            with_children(
                Block::builder()
                    .id("k1")
                    .block_type(BlockType::KeyValueSet)
                    .entity_types(EntityType::Key),
                RelationshipType::Child,
                &["w-name"],
            ),
            RelationshipType::Value,
            &["v1"],
        )
        .build();
        let value = with_children(
            Block::builder()
                .id("v1")
                .block_type(BlockType::KeyValueSet)
                .entity_types(EntityType::Value),
            RelationshipType::Child,
            &["w-john", "w-smith"],
        )
        .build();
        vec![
            Block::builder()
                .id("l1")
                .block_type(BlockType::Line)
                .text("Name: John Smith")
                .build(),
            table,
            cell("c11", 1, 1, &["w-acme"]),
            cell("c12", 1, 2, &["w-clerk"]),
            cell("c21", 2, 1, &[]),
            cell("c22", 2, 2, &["w-manager", "w-sel"]),
            key,
            value,
            word("w-name", "Name:"),
            word("w-john", "John"),
            word("w-smith", "Smith"),
            word("w-acme", "Acme"),
            word("w-clerk", "Clerk"),
            word("w-manager", "Manager"),
            Block::builder()
                .id("w-sel")
                .block_type(BlockType::SelectionElement)
                .selection_status(SelectionStatus::Selected)
                .build(),
        ]
    }

    #[test]
    fn test_blocks_to_analysis() {
        let result = analysis_from_blocks(&sample_blocks()).unwrap();
        assert_eq!(result.lines, vec!["Name: John Smith".to_owned()]);
        assert_eq!(
            result.tables,
            vec![DetectedTable::from_rows([
                ["Acme", "Clerk"],
                ["", "Manager X"]
            ])]
        );
        assert_eq!(result.field_pairs, vec![FieldPair::new("Name:", "John Smith")]);
    }

    #[test]
    fn test_missing_child_is_projection_error() {
        let table = with_children(
            Block::builder().id("t1").block_type(BlockType::Table),
            RelationshipType::Child,
            &["nowhere"],
        )
        .build();
        let err = analysis_from_blocks(&[table]).unwrap_err();
        assert!(matches!(err, PipelineError::Projection(_)));
    }

    #[test]
    fn test_key_without_value() {
        let key = with_children(
            Block::builder()
                .id("k1")
                .block_type(BlockType::KeyValueSet)
                .entity_types(EntityType::Key),
            RelationshipType::Child,
            &["w1"],
        )
        .build();
        let result = analysis_from_blocks(&[key, word("w1", "Signature")]).unwrap();
        assert_eq!(result.field_pairs, vec![FieldPair::new("Signature", "")]);
    }
}
