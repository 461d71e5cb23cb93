/// How a stored vector reaches the target width without calling a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
	Identity,
	/// Each component is repeated `factor` times in place.
	Repeat { factor: usize },
	/// The leading components are kept.
	Truncate,
	/// Zeros are appended. Only used when indivisible padding is enabled.
	ZeroPad,
}

pub fn plan(source_dim: usize, target_dim: usize, pad_indivisible: bool) -> Option<Conversion> {
	if source_dim == 0 || target_dim == 0 {
		return None;
	}

	if source_dim == target_dim {
		return Some(Conversion::Identity);
	}
	if source_dim > target_dim {
		return Some(Conversion::Truncate);
	}
	if target_dim % source_dim == 0 {
		return Some(Conversion::Repeat { factor: target_dim / source_dim });
	}
	if pad_indivisible {
		return Some(Conversion::ZeroPad);
	}

	None
}

/// Derives a `target_dim` vector from `source`. Returns `None` when no conversion applies.
pub fn convert_dimension(
	source: &[f32],
	target_dim: usize,
	pad_indivisible: bool,
) -> Option<Vec<f32>> {
	let converted = match plan(source.len(), target_dim, pad_indivisible)? {
		Conversion::Identity => source.to_vec(),
		Conversion::Repeat { factor } =>
			source.iter().flat_map(|value| std::iter::repeat_n(*value, factor)).collect(),
		Conversion::Truncate => source[..target_dim].to_vec(),
		Conversion::ZeroPad => {
			let mut padded = Vec::with_capacity(target_dim);

			padded.extend_from_slice(source);
			padded.resize(target_dim, 0.0);

			padded
		},
	};

	Some(converted)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn divisible_widths_repeat_each_component() {
		let source = [0.5, -1.0, 2.0];
		let converted = convert_dimension(&source, 6, false).expect("3 divides 6.");

		assert_eq!(converted, vec![0.5, 0.5, -1.0, -1.0, 2.0, 2.0]);
	}

	#[test]
	fn repeated_components_preserve_the_source_at_every_stride() {
		let source: Vec<f32> = (0..384).map(|i| i as f32 / 384.0).collect();
		let converted = convert_dimension(&source, 1536, false).expect("384 divides 1536.");

		assert_eq!(converted.len(), 1536);

		for (i, value) in converted.iter().enumerate() {
			assert_eq!(*value, source[i / 4]);
		}
	}

	#[test]
	fn wider_sources_are_truncated() {
		let source: Vec<f32> = (0..3072).map(|i| i as f32).collect();
		let converted = convert_dimension(&source, 1536, false).expect("Truncation applies.");

		assert_eq!(converted.as_slice(), &source[..1536]);
	}

	#[test]
	fn indivisible_widths_fail_unless_padding_is_enabled() {
		let source = vec![1.0; 512];

		assert_eq!(plan(512, 1536, false), Some(Conversion::Repeat { factor: 3 }));
		assert_eq!(plan(1000, 1536, false), None);
		assert_eq!(convert_dimension(&[1.0; 1000], 1536, false), None);

		let padded = convert_dimension(&source[..500], 1536, true).expect("Padding applies.");

		assert_eq!(padded.len(), 1536);
		assert!(padded[..500].iter().all(|value| *value == 1.0));
		assert!(padded[500..].iter().all(|value| *value == 0.0));
	}

	#[test]
	fn empty_vectors_never_convert() {
		assert_eq!(convert_dimension(&[], 8, true), None);
		assert_eq!(plan(4, 0, true), None);
	}

	#[test]
	fn matching_widths_are_identity() {
		assert_eq!(convert_dimension(&[1.0, 2.0], 2, false), Some(vec![1.0, 2.0]));
	}
}
