//! Render graph description.
//!
//! A render graph is an ordered list of subpasses, each naming the
//! attachments it reads (input attachments) and writes (color or
//! depth/stencil outputs) by index into the render target's attachment list.

use crate::error::{Error, Result};

/// Index of the presentable swapchain image in every attachment list.
pub const PRESENT_ATTACHMENT: u32 = 0;

/// Attachment usage of one subpass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubpassInfo {
    /// Attachments read as input attachments, in binding order.
    pub inputs: Vec<u32>,
    /// Attachments written by the subpass, in color-location order.
    pub outputs: Vec<u32>,
}

impl SubpassInfo {
    /// Create a subpass description.
    pub fn new(inputs: impl Into<Vec<u32>>, outputs: impl Into<Vec<u32>>) -> Self {
        Self {
            inputs: inputs.into(),
            outputs: outputs.into(),
        }
    }

    /// A subpass that only writes the given attachments.
    pub fn writes(outputs: impl Into<Vec<u32>>) -> Self {
        Self::new(Vec::new(), outputs)
    }

    /// Returns true if the subpass writes the presentable image.
    pub fn presents(&self) -> bool {
        self.outputs.contains(&PRESENT_ATTACHMENT)
    }
}

/// Check the structural invariants of a subpass list.
///
/// - at least one subpass;
/// - every index refers to one of `attachment_count` attachments;
/// - no index appears twice in the same input or output list;
/// - subpass 0 has no inputs (nothing has been written yet);
/// - the final subpass writes the presentable attachment.
pub fn validate_subpasses(subpasses: &[SubpassInfo], attachment_count: usize) -> Result<()> {
    let Some(last) = subpasses.last() else {
        return Err(Error::InvalidGraph("render graph has no subpasses".to_string()));
    };

    for (index, subpass) in subpasses.iter().enumerate() {
        check_list(index, "input", &subpass.inputs, attachment_count)?;
        check_list(index, "output", &subpass.outputs, attachment_count)?;
    }

    if !subpasses[0].inputs.is_empty() {
        return Err(Error::InvalidGraph(
            "subpass 0 cannot read input attachments".to_string(),
        ));
    }

    if !last.presents() {
        return Err(Error::InvalidGraph(format!(
            "final subpass {} must write attachment {PRESENT_ATTACHMENT}",
            subpasses.len() - 1
        )));
    }

    Ok(())
}

fn check_list(subpass: usize, kind: &str, indices: &[u32], attachment_count: usize) -> Result<()> {
    for (position, &attachment) in indices.iter().enumerate() {
        if attachment as usize >= attachment_count {
            return Err(Error::OutOfBounds(format!(
                "subpass {subpass} {kind} attachment {attachment} (have {attachment_count})"
            )));
        }
        if indices[..position].contains(&attachment) {
            return Err(Error::InvalidGraph(format!(
                "subpass {subpass} lists {kind} attachment {attachment} twice"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_subpass_is_valid() {
        let subpasses = [SubpassInfo::writes([0])];
        assert_eq!(validate_subpasses(&subpasses, 1), Ok(()));
    }

    #[test]
    fn two_subpass_graph_is_valid() {
        let subpasses = [SubpassInfo::writes([1, 2]), SubpassInfo::new([1, 2], [0])];
        assert_eq!(validate_subpasses(&subpasses, 3), Ok(()));
    }

    #[test]
    fn empty_graph_rejected() {
        assert!(matches!(
            validate_subpasses(&[], 1),
            Err(Error::InvalidGraph(_))
        ));
    }

    #[test]
    fn first_subpass_with_inputs_rejected() {
        let subpasses = [SubpassInfo::new([1], [0])];
        assert!(matches!(
            validate_subpasses(&subpasses, 2),
            Err(Error::InvalidGraph(_))
        ));
    }

    #[test]
    fn final_subpass_must_present() {
        let subpasses = [SubpassInfo::writes([1]), SubpassInfo::new([1], [2])];
        assert!(matches!(
            validate_subpasses(&subpasses, 3),
            Err(Error::InvalidGraph(_))
        ));
    }

    #[test]
    fn out_of_range_index_rejected() {
        let subpasses = [SubpassInfo::writes([0, 4])];
        assert!(matches!(
            validate_subpasses(&subpasses, 2),
            Err(Error::OutOfBounds(_))
        ));
    }

    #[test]
    fn duplicate_index_rejected() {
        let subpasses = [SubpassInfo::writes([1, 1]), SubpassInfo::new([1], [0])];
        assert!(matches!(
            validate_subpasses(&subpasses, 2),
            Err(Error::InvalidGraph(_))
        ));
    }

    #[test]
    fn same_attachment_as_input_and_output_allowed() {
        // Feedback loop: legal in Vulkan.
        let subpasses = [SubpassInfo::writes([1]), SubpassInfo::new([1], [1, 0])];
        assert_eq!(validate_subpasses(&subpasses, 2), Ok(()));
    }
}
